use std::sync::Arc;

use crate::generator::emitter::SimBackend;
use crate::workflow::config::ScenarioConfig;
use sweepcore::prelude::{
    EventSink, FanoutSink, LogSink, MetricsRecorder, MetricsSnapshot, ModeController, ModeState,
    ResourceManager,
};

pub struct RunSummary {
    pub metrics: MetricsSnapshot,
    pub final_state: ModeState,
}

pub struct Runner {
    config: ScenarioConfig,
}

impl Runner {
    pub fn new(config: ScenarioConfig) -> Self {
        Self { config }
    }

    /// Drive the engine against the synthetic front end for a fixed number
    /// of pump cycles and report what happened.
    pub async fn execute(
        &self,
        cycles: usize,
        extra_sink: Option<Arc<dyn EventSink>>,
    ) -> anyhow::Result<RunSummary> {
        let metrics = Arc::new(MetricsRecorder::new());
        let mut fanout = FanoutSink::new();
        fanout.push(Arc::new(LogSink::new()));
        fanout.push(metrics.clone());
        if let Some(sink) = extra_sink {
            fanout.push(sink);
        }
        let sink: Arc<dyn EventSink> = Arc::new(fanout);

        let backend = SimBackend::new(
            self.config.units,
            self.config.emitters.clone(),
            self.config.engine.df.geometry.clone(),
            self.config.phase_errors.clone(),
            self.config.noise_dbm,
            self.config.seed,
        );
        let manager = Arc::new(ResourceManager::new(backend, sink.clone()));
        manager.enumerate()?;

        let mut controller = ModeController::new(manager, sink, self.config.engine.clone())?;
        controller.start();
        for _ in 0..cycles {
            controller.pump().await?;
        }
        let final_state = controller.state();
        controller.shutdown().await;

        Ok(RunSummary {
            metrics: metrics.snapshot(),
            final_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::emitter::SimEmitter;
    use sweepcore::prelude::{BandAssignment, ScanConfig};

    fn quick_scenario() -> ScenarioConfig {
        let mut config = ScenarioConfig::default();
        config.emitters = vec![SimEmitter {
            frequency_hz: 146.0e6,
            power_dbm: -30.0,
            bearing_deg: 210.0,
            start_s: 0.0,
        }];
        config.engine.bands = vec![BandAssignment {
            band_name: "2m".into(),
            start_hz: 146.0e6,
            end_hz: 146.05e6,
            step_hz: 25.0e3,
            priority: 3,
        }];
        config.engine.scan = ScanConfig {
            integration_window_s: 0.01,
            stop_timeout_s: 0.5,
            ..ScanConfig::default()
        };
        config.engine.df.capture_samples = 4096;
        config
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn a_hot_emitter_produces_a_bearing() {
        let runner = Runner::new(quick_scenario());
        let summary = runner.execute(5, None).await.unwrap();
        assert!(summary.metrics.samples > 0);
        assert!(summary.metrics.anomalies >= 1);
        assert!(summary.metrics.bearings >= 1);
        assert_eq!(summary.final_state, ModeState::ParallelScan);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn a_quiet_band_never_switches_modes() {
        let mut scenario = quick_scenario();
        scenario.emitters.clear();
        let runner = Runner::new(scenario);
        let summary = runner.execute(3, None).await.unwrap();
        assert!(summary.metrics.samples > 0);
        assert_eq!(summary.metrics.mode_switches, 0);
    }
}
