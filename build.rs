use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding the crate's own Rust sources. Nothing outside them is scanned.
const SOURCE_DIRS: &[&str] = &["surrogate", "localize", "shared", "cli", "tests", "benches"];

const FORBIDDEN_WORDS_PATTERN: &str = r"(//|/\*|///).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)";

// What a matched line is checked for before it counts as a violation.
#[derive(Clone, Copy)]
enum Check {
    // Underscore-prefixed identifier outside comments and string literals.
    UnderscorePrefix,
    // Forbidden word anywhere in a comment, doc comments included.
    ForbiddenWord,
    // Double star in a comment other than a /// doc comment.
    DoubleStar,
    // Comment whose alphabetic characters are all uppercase.
    AllCaps,
    // Any match is a violation.
    Always,
}

struct Rule {
    pattern: &'static str,
    check: Check,
    include_build_script: bool,
    headline: &'static str,
    advice: &'static str,
}

// Collects the violating lines of a single file.
struct ViolationCollector {
    check: Check,
    violations: Vec<String>,
}

impl ViolationCollector {
    fn new(check: Check) -> Self {
        Self {
            check,
            violations: Vec::new(),
        }
    }

    fn error_message(&self, rule: &Rule, file_path: &Path) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        let mut message = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            rule.headline,
            file_path.display()
        );
        for violation in &self.violations {
            message.push_str(&format!("   {violation}\n"));
        }
        message.push_str(&format!("\n⚠️ {}\n", rule.advice));
        Some(message)
    }
}

fn is_doc_comment(line: &str) -> bool {
    line.trim_start().starts_with("///")
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//") || line.contains("/*")
}

// Text of the comment on `line`, without its marker.
fn comment_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("///") {
        Some(rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        Some(rest.trim())
    } else if let Some(start) = line.find("/*") {
        let rest = &line[start + 2..];
        Some(rest.find("*/").map_or(rest, |end| &rest[..end]).trim())
    } else {
        None
    }
}

// True when an underscore-prefixed word sits between double quotes.
fn inside_string_literal(line: &str) -> bool {
    line.split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

fn is_violation(check: Check, line: &str) -> bool {
    match check {
        Check::UnderscorePrefix => !is_comment(line) && !inside_string_literal(line),
        Check::ForbiddenWord | Check::Always => true,
        Check::DoubleStar => !is_doc_comment(line),
        Check::AllCaps => comment_text(line).is_some_and(|text| {
            let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
            letters.peek().is_some() && letters.all(char::is_uppercase)
        }),
    }
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if is_violation(self.check, line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn rust_sources(include_build_script: bool) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = SOURCE_DIRS
        .iter()
        .filter(|dir| Path::new(dir).is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect();
    if include_build_script {
        files.push(PathBuf::from("build.rs"));
    }
    files
}

fn scan(rule: &Rule) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(rule.pattern)?;
    let mut searcher = Searcher::new();

    for path in rust_sources(rule.include_build_script) {
        let mut collector = ViolationCollector::new(rule.check);
        searcher.search_path(&matcher, &path, &mut collector)?;
        if let Some(message) = collector.error_message(rule, &path) {
            return Err(message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    let rules = [
        Rule {
            pattern: r"\b(_[a-zA-Z0-9_]+)\b",
            check: Check::UnderscorePrefix,
            include_build_script: true,
            headline: "underscore-prefixed variables",
            advice: "Underscore-prefixed variable names are not allowed in this project. Use the value or remove it.",
        },
        Rule {
            pattern: FORBIDDEN_WORDS_PATTERN,
            check: Check::ForbiddenWord,
            include_build_script: false,
            headline: "forbidden comment patterns",
            advice: "Comments must describe the code as it is, not the edit history that produced it.",
        },
        Rule {
            pattern: r"(//|/\*).*\*\*",
            check: Check::DoubleStar,
            include_build_script: false,
            headline: "double-star comments",
            advice: "Double stars are only allowed in /// doc comments.",
        },
        Rule {
            pattern: r"(//|/\*)",
            check: Check::AllCaps,
            include_build_script: false,
            headline: "comments with all uppercase alphabetic characters",
            advice: "Comments where all alphabetic characters are uppercase are not allowed.",
        },
        Rule {
            pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
            check: Check::Always,
            include_build_script: false,
            headline: "#[allow(dead_code)] attributes",
            advice: "Either use the code (removing the attribute) or remove it completely.",
        },
    ];

    for rule in &rules {
        if let Err(e) = scan(rule) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
