//! Dry-run runtime: writes every program to stdout instead of playing it

use super::EvalRuntime;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct PrintRuntime {
    evaluations: AtomicU64,
}

impl PrintRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluation_count(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }
}

impl EvalRuntime for PrintRuntime {
    async fn evaluate(&self, program: &str, reset_all: bool, hush_first: bool) -> Result<(), String> {
        let n = self.evaluations.fetch_add(1, Ordering::Relaxed) + 1;
        println!(
            "-- eval #{} (reset={}, hush={})\n{}\n",
            n, reset_all, hush_first, program
        );
        Ok(())
    }

    fn stop(&self) -> Result<(), String> {
        println!("-- hush\n");
        Ok(())
    }

    fn set_tempo(&self, cps: f64) -> Result<(), String> {
        println!("-- cps {:.4}\n", cps);
        Ok(())
    }

    async fn preload_sample(&self, url: &str) -> Result<(), String> {
        info!("Dry run: would preload {}", url);
        Ok(())
    }
}
