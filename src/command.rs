/*! Commands sent from the ground to the satellite.

Commands are ASCII keywords terminated by a newline, e.g. `Parar\n`. Some
take arguments, separated by `:`.

Writes from different threads (alarm from the reader, user commands from
the control side) go through one [`CommandWriter`], and are never
interleaved.
*/
use std::io::Write;
use std::sync::{Arc, Mutex};

use log::{debug, info};

use crate::aggregate::Mode;
use crate::{Error, Result};

/// Which periodic measurement a period command applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodTarget {
    /// Temperature and humidity.
    Sensor,
    /// Radar sweep.
    Radar,
    /// Servo position reports.
    Servo,
}

/// Outbound command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start sending data.
    Start,
    /// Stop sending data.
    Pause,
    /// Resume sending data.
    Resume,
    /// Temperature alarm.
    Alarm,
    /// Select who computes the moving average.
    Mode(Mode),
    /// Set a measurement period.
    Period {
        /// What to change.
        target: PeriodTarget,
        /// New period.
        millis: u32,
    },
    /// Point the servo.
    Servo(u16),
}

impl Command {
    /// Wire encoding of the command.
    #[must_use]
    pub fn encode(&self) -> String {
        let body = match self {
            Command::Start => "Iniciar".to_string(),
            Command::Pause => "Parar".to_string(),
            Command::Resume => "Reanudar".to_string(),
            Command::Alarm => "Alarma".to_string(),
            Command::Mode(Mode::GroundComputed) => "Modo:Tierra".to_string(),
            Command::Mode(Mode::SatelliteComputed) => "Modo:Satelite".to_string(),
            Command::Period { target, millis } => {
                let t = match target {
                    PeriodTarget::Sensor => "Sensor",
                    PeriodTarget::Radar => "Radar",
                    PeriodTarget::Servo => "Servo",
                };
                format!("Periodo:{t}:{millis}")
            }
            Command::Servo(deg) => format!("Servo:{deg}"),
        };
        body + "\n"
    }
}

/// Serialized writer of commands to the satellite link.
#[derive(Clone)]
pub struct CommandWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl CommandWriter {
    /// Wrap the write half of the link.
    pub fn new<W: Write + Send + 'static>(w: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(w))),
        }
    }

    /// Send one command.
    pub fn send(&self, cmd: &Command) -> Result<()> {
        let data = cmd.encode();
        let mut w = self
            .inner
            .lock()
            .map_err(|e| Error::msg(format!("command writer lock poisoned: {e}")))?;
        w.write_all(data.as_bytes())
            .and_then(|_| w.flush())
            .map_err(|e| Error::wrap(e, format!("sending {cmd:?}")))?;
        if *cmd == Command::Alarm {
            debug!("Sent {:?}", data.trim_end());
        } else {
            info!("Sent {:?}", data.trim_end());
        }
        Ok(())
    }
}

impl std::fmt::Debug for CommandWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CommandWriter").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Writer that can be inspected after being handed off.
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        pub(crate) fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn encoding() {
        assert_eq!(Command::Pause.encode(), "Parar\n");
        assert_eq!(Command::Resume.encode(), "Reanudar\n");
        assert_eq!(Command::Alarm.encode(), "Alarma\n");
        assert_eq!(
            Command::Mode(Mode::SatelliteComputed).encode(),
            "Modo:Satelite\n"
        );
        assert_eq!(
            Command::Period {
                target: PeriodTarget::Radar,
                millis: 250
            }
            .encode(),
            "Periodo:Radar:250\n"
        );
        assert_eq!(Command::Servo(120).encode(), "Servo:120\n");
    }

    #[test]
    fn writer_from_threads() -> Result<()> {
        let buf = SharedBuf::default();
        let w = CommandWriter::new(buf.clone());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let w = w.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        w.send(&Command::Alarm).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let text = buf.text();
        assert_eq!(text.lines().count(), 200);
        assert!(text.lines().all(|l| l == "Alarma"));
        Ok(())
    }
}
