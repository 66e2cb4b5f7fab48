// utils/barrier.rs
//
// Rendezvous between hosts sharing a directory. Each host drops a marker
// `<stage>.<host_id>` and polls until every host's marker for that stage is
// present. Markers live under `<barrier_dir>/<run_id>` when a run id is set;
// a host refuses to start where its own markers already exist.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use log::{debug, info};

use crate::config::subsystems::ProcessorConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct HostBarrier {
    dir: Option<PathBuf>,
    host_id: usize,
    host_count: usize,
    timeout: Duration,
    poll: Duration,
}

impl HostBarrier {
    pub fn new(config: &ProcessorConfig) -> Result<Self> {
        let dir = if config.is_multi_host() {
            let base = config
                .barrier_dir
                .as_ref()
                .ok_or_else(|| Error::config("barrier_dir is required when host_count > 1"))?;
            let dir = match &config.run_id {
                Some(run_id) => base.join(run_id),
                None => base.clone(),
            };
            fs::create_dir_all(&dir)?;
            Self::check_unused(&dir, config.host_id)?;
            Some(dir)
        } else {
            None
        };
        Ok(Self {
            dir,
            host_id: config.host_id,
            host_count: config.host_count,
            timeout: config.barrier_timeout(),
            poll: config.barrier_poll(),
        })
    }

    pub fn host_id(&self) -> usize {
        self.host_id
    }

    /// Whether this host runs the single-writer steps (combine, banish, output).
    pub fn is_leader(&self) -> bool {
        self.host_id == 0
    }

    /// Markers left by this host in an earlier run would satisfy barriers early.
    fn check_unused(dir: &Path, host_id: usize) -> Result<()> {
        let suffix = format!(".{}", host_id);
        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();
            if name.to_string_lossy().ends_with(&suffix) {
                return Err(Error::barrier(format!(
                    "{:?} already holds markers for host {}; use a new run_id or clear the directory",
                    dir, host_id
                )));
            }
        }
        Ok(())
    }

    fn marker(dir: &Path, stage: &str, host_id: usize) -> PathBuf {
        dir.join(format!("{}.{}", stage, host_id))
    }

    /// Marks `stage` done for this host and blocks until all hosts have marked it.
    ///
    /// A no-op with a single host. Fails with [`Error::Barrier`] after the timeout.
    pub fn wait(&self, stage: &str) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let mine = Self::marker(dir, stage, self.host_id);
        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&mine)?;
        writeln!(file, "{}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
        debug!("Host {} reached barrier '{}'", self.host_id, stage);

        let start = Instant::now();
        loop {
            let missing: Vec<usize> = (0..self.host_count)
                .filter(|&h| !Self::marker(dir, stage, h).exists())
                .collect();
            if missing.is_empty() {
                info!("All {} hosts passed barrier '{}' in {:?}", self.host_count, stage, start.elapsed());
                return Ok(());
            }
            if start.elapsed() >= self.timeout {
                return Err(Error::barrier(format!(
                    "timed out after {:?} at '{}' waiting for hosts {:?}",
                    self.timeout, stage, missing
                )));
            }
            thread::sleep(self.poll);
        }
    }
}
