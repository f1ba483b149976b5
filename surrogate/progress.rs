use std::fmt;
use std::time::{Duration, Instant};

/// Stages reported while building a super ensemble and its localization matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Validation,
    Scaling,
    Training,
    Prediction,
    CrossCovariance,
    Localization,
}

impl PipelineStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Validation => "matrix compatibility validation",
            Self::Scaling => "dataset scaling",
            Self::Training => "surrogate training",
            Self::Prediction => "super ensemble prediction",
            Self::CrossCovariance => "cross-covariance estimation",
            Self::Localization => "localization weights",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Non-finite localization weights that are replaced instead of raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Anomaly {
    NaN,
    Infinite,
}

impl Anomaly {
    pub fn describe(self) -> &'static str {
        match self {
            Self::NaN => "NaN",
            Self::Infinite => "infinite",
        }
    }

    /// Value substituted for an anomalous weight.
    pub fn replacement(self) -> f64 {
        match self {
            Self::NaN => 0.0,
            Self::Infinite => 1.0,
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for reporting stage timing and diagnostics while the pipeline runs.
///
/// Every hook has an empty default so observers only implement what they care
/// about. Library entry points without an observer argument use [`NoopObserver`].
pub trait StageObserver {
    fn on_stage_start(&mut self, stage: PipelineStage) {
        let _ = stage;
    }
    fn on_stage_finish(&mut self, stage: PipelineStage, elapsed: Duration) {
        let _ = (stage, elapsed);
    }
    fn on_training_error(&mut self, rmse: f64) {
        let _ = rmse;
    }
    fn on_anomaly(&mut self, anomaly: Anomaly, count: usize) {
        let _ = (anomaly, count);
    }
}

#[derive(Default)]
pub struct NoopObserver;

impl StageObserver for NoopObserver {}

/// Forwards every event to the `log` facade.
#[derive(Default)]
pub struct LogObserver;

impl StageObserver for LogObserver {
    fn on_stage_start(&mut self, stage: PipelineStage) {
        log::info!("Starting {stage}...");
    }

    fn on_stage_finish(&mut self, stage: PipelineStage, elapsed: Duration) {
        log::info!(
            "Finished {stage}! Elapsed time = {:.4} s",
            elapsed.as_secs_f64()
        );
    }

    fn on_training_error(&mut self, rmse: f64) {
        log::info!("Surrogate training rmse [outputs range (-1, 1)] = {rmse:.4}");
    }

    fn on_anomaly(&mut self, anomaly: Anomaly, count: usize) {
        log::warn!(
            "Localization matrix contains {count} {anomaly} values. Replacing with {}.",
            anomaly.replacement()
        );
    }
}

/// Runs `work` between the start and finish notifications of `stage`.
pub fn timed<O, T>(observer: &mut O, stage: PipelineStage, work: impl FnOnce() -> T) -> T
where
    O: StageObserver + ?Sized,
{
    observer.on_stage_start(stage);
    let start = Instant::now();
    let output = work();
    observer.on_stage_finish(stage, start.elapsed());
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl StageObserver for Recorder {
        fn on_stage_start(&mut self, stage: PipelineStage) {
            self.events.push(format!("start:{stage}"));
        }
        fn on_stage_finish(&mut self, stage: PipelineStage, elapsed: Duration) {
            assert!(elapsed >= Duration::ZERO);
            self.events.push(format!("finish:{stage}"));
        }
    }

    #[test]
    fn timed_brackets_the_work() {
        let mut recorder = Recorder::default();
        let value = timed(&mut recorder, PipelineStage::Scaling, || 7);
        assert_eq!(value, 7);
        assert_eq!(
            recorder.events,
            vec!["start:dataset scaling", "finish:dataset scaling"]
        );
    }

    #[test]
    fn anomaly_replacements_are_asymmetric() {
        assert_eq!(Anomaly::NaN.replacement(), 0.0);
        assert_eq!(Anomaly::Infinite.replacement(), 1.0);
    }
}
