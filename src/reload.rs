//! Asking the owning service to pick up the rewritten file.
//!
//! The policy is graceful first, forceful second: reload the service if it
//! is running, restart it if the reload fails, and report an error only when
//! both fail. A service whose state cannot be queried is treated as
//! running. By then the file is already written, so callers log the error
//! and move on.

use serde::Serialize;
use std::io;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Default timeout for a single service-manager call, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Error type for reload operations.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// The service manager binary could not be started
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The call did not finish within its timeout and was killed
    #[error("`{command}` timed out after {}s", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// The call finished unsuccessfully
    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: ExitStatus },

    /// Both the graceful reload and the restart failed
    #[error("reload failed ({reload}); restart failed ({restart})")]
    Exhausted {
        reload: Box<ReloadError>,
        restart: Box<ReloadError>,
    },
}

/// What the reload trigger ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadOutcome {
    /// No service is configured
    Skipped,
    /// The service is not running; it reads the file when it next starts
    Inactive,
    /// Graceful reload succeeded
    Reloaded,
    /// Reload failed and a restart succeeded
    Restarted,
}

impl std::fmt::Display for ReloadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReloadOutcome::Skipped => write!(f, "skipped"),
            ReloadOutcome::Inactive => write!(f, "inactive"),
            ReloadOutcome::Reloaded => write!(f, "reloaded"),
            ReloadOutcome::Restarted => write!(f, "restarted"),
        }
    }
}

/// Capability to query and signal the owning service, provided by the
/// process supervisor.
pub trait ServiceControl: Send + Sync {
    /// Name of the controlled service (for display purposes).
    fn name(&self) -> &str;

    /// Whether the service is currently running.
    fn is_active(&self) -> Result<bool, ReloadError>;

    /// Ask the service to re-read its configuration.
    fn reload(&self) -> Result<(), ReloadError>;

    /// Stop and start the service.
    fn restart(&self) -> Result<(), ReloadError>;
}

/// Controls a systemd unit through `systemctl`.
#[derive(Debug, Clone)]
pub struct Systemctl {
    unit: String,
    timeout: Duration,
}

impl Systemctl {
    pub fn new(unit: &str, timeout: Duration) -> Self {
        Self {
            unit: unit.to_string(),
            timeout,
        }
    }

    /// Run `systemctl <args> <unit>` and wait at most `self.timeout` for it.
    fn run(&self, args: &[&str]) -> Result<ExitStatus, ReloadError> {
        let command = format!("systemctl {} {}", args.join(" "), self.unit);

        let mut child = Command::new("systemctl")
            .args(args)
            .arg(&self.unit)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ReloadError::Spawn {
                program: "systemctl".to_string(),
                source,
            })?;

        match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => Ok(status),
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(ReloadError::Timeout {
                    command,
                    timeout: self.timeout,
                })
            }
            Err(source) => Err(ReloadError::Spawn {
                program: "systemctl".to_string(),
                source,
            }),
        }
    }

    fn run_checked(&self, args: &[&str]) -> Result<(), ReloadError> {
        let status = self.run(args)?;
        if status.success() {
            Ok(())
        } else {
            Err(ReloadError::Failed {
                command: format!("systemctl {} {}", args.join(" "), self.unit),
                status,
            })
        }
    }
}

impl ServiceControl for Systemctl {
    fn name(&self) -> &str {
        &self.unit
    }

    fn is_active(&self) -> Result<bool, ReloadError> {
        // is-active reports through its exit code only
        Ok(self.run(&["is-active", "--quiet"])?.success())
    }

    fn reload(&self) -> Result<(), ReloadError> {
        self.run_checked(&["reload"])
    }

    fn restart(&self) -> Result<(), ReloadError> {
        self.run_checked(&["restart"])
    }
}

/// Applies the reload policy to an optional service.
pub struct ReloadTrigger {
    control: Option<Box<dyn ServiceControl>>,
}

impl ReloadTrigger {
    pub fn new(control: Option<Box<dyn ServiceControl>>) -> Self {
        Self { control }
    }

    /// A trigger with no service attached; every notify is `Skipped`.
    pub fn disabled() -> Self {
        Self { control: None }
    }

    /// Name of the controlled service, if any.
    pub fn service(&self) -> Option<&str> {
        self.control.as_ref().map(|c| c.name())
    }

    /// Ask the owning service to pick up the new file.
    pub fn notify(&self) -> Result<ReloadOutcome, ReloadError> {
        let Some(control) = &self.control else {
            return Ok(ReloadOutcome::Skipped);
        };

        match control.is_active() {
            Ok(true) => {}
            Ok(false) => return Ok(ReloadOutcome::Inactive),
            Err(e) => {
                // State unknown: go ahead with reload, then restart
                tracing::warn!(service = control.name(), error = %e, "could not query service state");
            }
        }

        match control.reload() {
            Ok(()) => Ok(ReloadOutcome::Reloaded),
            Err(reload) => {
                tracing::warn!(service = control.name(), error = %reload, "graceful reload failed, restarting");
                match control.restart() {
                    Ok(()) => Ok(ReloadOutcome::Restarted),
                    Err(restart) => Err(ReloadError::Exhausted {
                        reload: Box::new(reload),
                        restart: Box::new(restart),
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scripted service for reload policy tests.
    #[derive(Default)]
    pub struct FakeService {
        pub inactive: bool,
        pub query_fails: bool,
        pub reload_fails: bool,
        pub restart_fails: bool,
        pub calls: Arc<Mutex<Vec<&'static str>>>,
        pub reloads: Arc<AtomicUsize>,
    }

    fn failure(command: &str) -> ReloadError {
        ReloadError::Spawn {
            program: command.to_string(),
            source: io::Error::other("scripted failure"),
        }
    }

    impl ServiceControl for FakeService {
        fn name(&self) -> &str {
            "fake"
        }

        fn is_active(&self) -> Result<bool, ReloadError> {
            self.calls.lock().unwrap().push("is_active");
            if self.query_fails {
                return Err(ReloadError::Timeout {
                    command: "systemctl is-active fake".to_string(),
                    timeout: Duration::from_secs(30),
                });
            }
            Ok(!self.inactive)
        }

        fn reload(&self) -> Result<(), ReloadError> {
            self.calls.lock().unwrap().push("reload");
            self.reloads.fetch_add(1, Ordering::SeqCst);
            if self.reload_fails {
                Err(failure("reload"))
            } else {
                Ok(())
            }
        }

        fn restart(&self) -> Result<(), ReloadError> {
            self.calls.lock().unwrap().push("restart");
            if self.restart_fails {
                Err(failure("restart"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_no_service_is_skipped() {
        let trigger = ReloadTrigger::disabled();
        assert_eq!(trigger.notify().unwrap(), ReloadOutcome::Skipped);
        assert_eq!(trigger.service(), None);
    }

    #[test]
    fn test_inactive_service_is_left_alone() {
        let service = FakeService {
            inactive: true,
            ..Default::default()
        };
        let calls = service.calls.clone();
        let trigger = ReloadTrigger::new(Some(Box::new(service)));

        assert_eq!(trigger.notify().unwrap(), ReloadOutcome::Inactive);
        assert_eq!(*calls.lock().unwrap(), vec!["is_active"]);
    }

    #[test]
    fn test_graceful_reload() {
        let service = FakeService::default();
        let calls = service.calls.clone();
        let trigger = ReloadTrigger::new(Some(Box::new(service)));

        assert_eq!(trigger.notify().unwrap(), ReloadOutcome::Reloaded);
        assert_eq!(*calls.lock().unwrap(), vec!["is_active", "reload"]);
    }

    #[test]
    fn test_failed_state_query_still_reloads() {
        let service = FakeService {
            query_fails: true,
            ..Default::default()
        };
        let calls = service.calls.clone();
        let trigger = ReloadTrigger::new(Some(Box::new(service)));

        assert_eq!(trigger.notify().unwrap(), ReloadOutcome::Reloaded);
        assert_eq!(*calls.lock().unwrap(), vec!["is_active", "reload"]);
    }

    #[test]
    fn test_failed_state_query_falls_back_to_restart() {
        let service = FakeService {
            query_fails: true,
            reload_fails: true,
            ..Default::default()
        };
        let calls = service.calls.clone();
        let trigger = ReloadTrigger::new(Some(Box::new(service)));

        assert_eq!(trigger.notify().unwrap(), ReloadOutcome::Restarted);
        assert_eq!(*calls.lock().unwrap(), vec!["is_active", "reload", "restart"]);
    }

    #[test]
    fn test_reload_failure_falls_back_to_restart() {
        let service = FakeService {
            reload_fails: true,
            ..Default::default()
        };
        let calls = service.calls.clone();
        let trigger = ReloadTrigger::new(Some(Box::new(service)));

        assert_eq!(trigger.notify().unwrap(), ReloadOutcome::Restarted);
        assert_eq!(*calls.lock().unwrap(), vec!["is_active", "reload", "restart"]);
    }

    #[test]
    fn test_total_failure_is_reported() {
        let service = FakeService {
            reload_fails: true,
            restart_fails: true,
            ..Default::default()
        };
        let trigger = ReloadTrigger::new(Some(Box::new(service)));

        let err = trigger.notify().unwrap_err();
        assert!(matches!(err, ReloadError::Exhausted { .. }));
        let msg = err.to_string();
        assert!(msg.contains("reload failed"));
        assert!(msg.contains("restart failed"));
    }

    #[test]
    fn test_reload_outcome_display() {
        assert_eq!(ReloadOutcome::Reloaded.to_string(), "reloaded");
        assert_eq!(ReloadOutcome::Skipped.to_string(), "skipped");
    }
}
