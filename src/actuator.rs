//! Serial gate actuator.
//!
//! The physical gate controller listens on a serial line for one-word
//! commands. The link is strictly best-effort: a missing device, a failed
//! open, or a failed write downgrades to a warning and the engine keeps
//! deciding without it.

/// Default line speed of the gate controller.
pub const DEFAULT_ACTUATOR_BAUD: u32 = 9600;

/// Signal mirrored to the actuator on each final verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateSignal {
    Safe,
    Violation,
}

impl GateSignal {
    /// Wire command, sent newline-terminated.
    pub fn command(&self) -> &'static str {
        match self {
            GateSignal::Safe => "SAFE",
            GateSignal::Violation => "VIOLATION",
        }
    }
}

/// Handle to the (optional) serial-attached gate controller.
pub struct ActuatorLink {
    backend: ActuatorBackend,
}

enum ActuatorBackend {
    Disabled,
    #[cfg(feature = "actuator-serial")]
    Serial(serial::SerialActuator),
}

impl ActuatorLink {
    pub fn disabled() -> Self {
        Self {
            backend: ActuatorBackend::Disabled,
        }
    }

    /// Open the configured port, if any. Never fails: an unreachable device
    /// leaves the link disabled with a warning.
    pub fn open(port: Option<&str>, baud: u32) -> Self {
        let Some(port) = port else {
            return Self::disabled();
        };
        #[cfg(feature = "actuator-serial")]
        {
            match serial::SerialActuator::open(port, baud) {
                Ok(actuator) => {
                    log::info!("actuator connected on {} at {} baud", port, baud);
                    Self {
                        backend: ActuatorBackend::Serial(actuator),
                    }
                }
                Err(err) => {
                    log::warn!("actuator connection failed on {}: {:?}", port, err);
                    Self::disabled()
                }
            }
        }
        #[cfg(not(feature = "actuator-serial"))]
        {
            let _ = baud;
            log::warn!(
                "actuator port {} configured but built without the actuator-serial feature",
                port
            );
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.backend, ActuatorBackend::Disabled)
    }

    /// Send one command line, best-effort.
    pub fn signal(&mut self, signal: GateSignal) {
        match &mut self.backend {
            ActuatorBackend::Disabled => {}
            #[cfg(feature = "actuator-serial")]
            ActuatorBackend::Serial(actuator) => {
                if let Err(err) = actuator.send(signal.command()) {
                    log::warn!("actuator write failed: {:?}", err);
                }
            }
        }
    }
}

#[cfg(feature = "actuator-serial")]
mod serial {
    use anyhow::{Context, Result};
    use std::io::Write;
    use std::time::Duration;

    const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

    pub struct SerialActuator {
        port: Box<dyn serialport::SerialPort>,
    }

    impl SerialActuator {
        pub fn open(path: &str, baud: u32) -> Result<Self> {
            let port = serialport::new(path, baud)
                .timeout(WRITE_TIMEOUT)
                .open()
                .with_context(|| format!("opening serial port {}", path))?;
            Ok(Self { port })
        }

        pub fn send(&mut self, command: &str) -> Result<()> {
            self.port
                .write_all(format!("{}\n", command).as_bytes())
                .context("writing actuator command")?;
            self.port.flush().context("flushing actuator command")?;
            Ok(())
        }
    }
}
