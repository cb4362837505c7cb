//! Check that decoding is independent of thread count.
//!
//! Decodes the same synthetic sequence once per requested thread count and fails unless
//! every run produces identical frame checksums with no dependency violations.

use anyhow::{Result, bail};
use clap::Parser;
use log::{error, info};

use decmt_lib::logging::OperationTimer;

use crate::commands::command::Command;
use crate::commands::common::{
    GeometryOptions, SchedulerOptions, SyntheticOptions, decode_sequence, log_geometry,
};

/// Verify bit-exact output across thread counts.
#[derive(Debug, Parser)]
#[command(
    name = "verify",
    about = "\x1b[38;5;72m[SCHEDULING]\x1b[0m     \x1b[36mVerify identical output across thread counts\x1b[0m",
    long_about = r#"
Decode the same synthetic sequence at several thread counts and compare the results.

Every run must produce the same checksum for every frame, run every job exactly once and
observe no dependency violations. The first run is the reference.

Example usage:
  decmt verify
  decmt verify --threads 1 --threads 3 --threads 16 --tile-cost 2000
"#
)]
pub struct Verify {
    /// Thread counts to compare
    #[arg(short = 't', long = "threads", num_args = 1.., default_values_t = vec![1, 2, 4, 8])]
    pub threads: Vec<usize>,

    /// Picture and tile options
    #[command(flatten)]
    pub geometry: GeometryOptions,

    /// Synthetic decoder options
    #[command(flatten)]
    pub synthetic: SyntheticOptions,

    /// Scheduler options
    #[command(flatten)]
    pub scheduler: SchedulerOptions,
}

impl Command for Verify {
    fn execute(&self, _command_line: &str) -> Result<()> {
        if self.threads.is_empty() || self.threads.contains(&0) {
            bail!("--threads values must be at least 1");
        }
        self.synthetic.validate()?;
        let geometry = self.geometry.frame_geometry()?;

        info!("Starting Verify");
        log_geometry(&geometry);
        info!("Thread counts: {:?}", self.threads);

        let timer = OperationTimer::new("Verifying thread-count independence");
        let mut reference: Option<(usize, Vec<u64>)> = None;
        let mut failures = 0_usize;
        for &threads in &self.threads {
            let outcome = decode_sequence(
                self.scheduler.config(threads),
                self.synthetic.frames,
                &self.synthetic.config(),
                |_| Ok(geometry.clone()),
                None,
            )?;
            info!("{threads} threads: checksum {:016x}", outcome.sequence_checksum());

            if outcome.violations > 0 || outcome.bad_claim_frames > 0 {
                error!(
                    "{threads} threads: {} dependency violations, {} frames with missing or repeated jobs",
                    outcome.violations, outcome.bad_claim_frames
                );
                failures += 1;
            }
            match &reference {
                None => reference = Some((threads, outcome.checksums)),
                Some((ref_threads, expected)) => {
                    if let Some(frame) =
                        expected.iter().zip(&outcome.checksums).position(|(a, b)| a != b)
                    {
                        error!("{threads} threads differ from {ref_threads} threads at frame {frame}");
                        failures += 1;
                    }
                }
            }
        }
        timer.log_completion(self.synthetic.frames * self.threads.len() as u64);

        if failures > 0 {
            bail!("Verification failed for {failures} of {} runs", self.threads.len());
        }
        info!("All {} runs produced identical output", self.threads.len());
        Ok(())
    }
}
