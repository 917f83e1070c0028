//! Scriptable collaborators for exercising the engine without Docker or
//! root access.
//!
//! Each mock records call counts in atomics and, where useful, the global
//! order of calls in a shared [`CallLog`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::agent::AgentRuntime;
use crate::error::{Result, SupervisorError};
use crate::network::{CredentialsProxyRoute, LoopbackRouting};

/// Ordered record of collaborator calls, shared between mocks.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<&'static str>>>);

impl CallLog {
    pub fn push(&self, call: &'static str) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

/// One scripted outcome of `start_agent`: an exit status or an error message.
pub type StartOutcome = std::result::Result<i64, String>;

pub struct MockAgentRuntime {
    pub log: CallLog,
    start_outcomes: Mutex<VecDeque<StartOutcome>>,
    /// 1-based `remove_existing_agent_container` calls that fail.
    remove_failures: Mutex<Vec<usize>>,
    pub check_image_count: AtomicUsize,
    pub remove_count: AtomicUsize,
    pub start_count: AtomicUsize,
    pub stop_count: AtomicUsize,
    pub download_count: AtomicUsize,
    pub load_cache_count: AtomicUsize,
    pub fail_check_image: AtomicBool,
    pub fail_stop: AtomicBool,
    pub fail_download: AtomicBool,
    pub fail_load_cache: AtomicBool,
}

impl MockAgentRuntime {
    /// `start_agent` returns `exit_codes` in order, then errors once they run out.
    pub fn new(exit_codes: impl IntoIterator<Item = i64>) -> Self {
        Self::with_outcomes(exit_codes.into_iter().map(Ok))
    }

    pub fn with_outcomes(outcomes: impl IntoIterator<Item = StartOutcome>) -> Self {
        Self {
            log: CallLog::default(),
            start_outcomes: Mutex::new(outcomes.into_iter().collect()),
            remove_failures: Mutex::new(Vec::new()),
            check_image_count: AtomicUsize::new(0),
            remove_count: AtomicUsize::new(0),
            start_count: AtomicUsize::new(0),
            stop_count: AtomicUsize::new(0),
            download_count: AtomicUsize::new(0),
            load_cache_count: AtomicUsize::new(0),
            fail_check_image: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            fail_download: AtomicBool::new(false),
            fail_load_cache: AtomicBool::new(false),
        }
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Make the `nth` (1-based) removal call fail.
    pub fn fail_remove_on(self, nth: usize) -> Self {
        self.remove_failures.lock().unwrap().push(nth);
        self
    }

    fn fail_if(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::Relaxed) {
            Err(SupervisorError::Docker(format!("mock {what} failure")))
        } else {
            Ok(())
        }
    }
}

impl Default for MockAgentRuntime {
    /// A runtime whose `start_agent` always fails; for tests of other phases.
    fn default() -> Self {
        Self::with_outcomes(Vec::<StartOutcome>::new())
    }
}

#[async_trait::async_trait]
impl AgentRuntime for MockAgentRuntime {
    async fn check_and_load_image(&self) -> Result<()> {
        self.log.push("check_and_load_image");
        self.check_image_count.fetch_add(1, Ordering::Relaxed);
        Self::fail_if(&self.fail_check_image, "image check")
    }

    async fn remove_existing_agent_container(&self) -> Result<()> {
        self.log.push("remove_existing_agent_container");
        let nth = self.remove_count.fetch_add(1, Ordering::Relaxed) + 1;
        if self.remove_failures.lock().unwrap().contains(&nth) {
            return Err(SupervisorError::Docker("mock remove failure".into()));
        }
        Ok(())
    }

    async fn start_agent(&self) -> Result<i64> {
        self.log.push("start_agent");
        self.start_count.fetch_add(1, Ordering::Relaxed);
        match self.start_outcomes.lock().unwrap().pop_front() {
            Some(Ok(code)) => Ok(code),
            Some(Err(msg)) => Err(SupervisorError::Docker(msg)),
            None => Err(SupervisorError::Docker("mock start script exhausted".into())),
        }
    }

    async fn stop_agent(&self) -> Result<()> {
        self.log.push("stop_agent");
        self.stop_count.fetch_add(1, Ordering::Relaxed);
        Self::fail_if(&self.fail_stop, "stop")
    }

    async fn download_agent_image(&self) -> Result<()> {
        self.log.push("download_agent_image");
        self.download_count.fetch_add(1, Ordering::Relaxed);
        Self::fail_if(&self.fail_download, "download")
    }

    async fn load_cached_image(&self) -> Result<()> {
        self.log.push("load_cached_image");
        self.load_cache_count.fetch_add(1, Ordering::Relaxed);
        Self::fail_if(&self.fail_load_cache, "cache load")
    }
}

#[derive(Default)]
pub struct MockLoopbackRouting {
    pub log: CallLog,
    pub enable_count: AtomicUsize,
    pub restore_count: AtomicUsize,
    pub fail_enable: AtomicBool,
    pub fail_restore: AtomicBool,
}

impl MockLoopbackRouting {
    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl LoopbackRouting for MockLoopbackRouting {
    async fn enable(&self) -> Result<()> {
        self.log.push("loopback_enable");
        self.enable_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_enable.load(Ordering::Relaxed) {
            return Err(SupervisorError::Network("mock enable failure".into()));
        }
        Ok(())
    }

    async fn restore_default(&self) -> Result<()> {
        self.log.push("loopback_restore");
        self.restore_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_restore.load(Ordering::Relaxed) {
            return Err(SupervisorError::Network("mock restore failure".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockCredentialsProxyRoute {
    pub log: CallLog,
    pub create_count: AtomicUsize,
    pub remove_count: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_remove: AtomicBool,
}

impl MockCredentialsProxyRoute {
    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl CredentialsProxyRoute for MockCredentialsProxyRoute {
    async fn create(&self) -> Result<()> {
        self.log.push("route_create");
        self.create_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_create.load(Ordering::Relaxed) {
            return Err(SupervisorError::Command("mock create failure".into()));
        }
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        self.log.push("route_remove");
        self.remove_count.fetch_add(1, Ordering::Relaxed);
        if self.fail_remove.load(Ordering::Relaxed) {
            return Err(SupervisorError::Command("mock remove failure".into()));
        }
        Ok(())
    }
}
