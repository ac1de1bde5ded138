/*! This crate decodes the telemetry link of a small satellite on the
ground.

The satellite sends temperature, humidity, servo, radar and free text data
over a single serial byte stream, using a compact delimited protocol. This
crate turns that stream into typed messages, and keeps the state a ground
station display needs: sensor time series with a moving average, a
temperature alarm, a radar sweep with a self-adjusting scale, and a short
log of text messages.

Drawing that state is not done here. A display (or anything else) takes a
[`Snapshot`][telemetry::Snapshot] whenever it wants one.

# Architecture overview

The decoder is a small graph of blocks connected by streams, run by a
single reader thread:

```text
     [ Byte stream (serial, TCP, file) ]
                    ↓
     [ FrameSource: split on '|'       ]
                    ↓
     [ Decoder: classify, apply        ] → alarm commands
                    ↓
     [ Telemetry (behind a mutex)      ] → snapshots
```

# Protocol

Every frame is `16:<group>:<code>[:<value>...]|`. See [`message`] for the
groups and codes.

# Examples

```
use groundlink::config::Config;
use groundlink::station::Station;
let link = std::io::Cursor::new(b"16:1:01:25.5|16:1:02:60.0|16:1:03:26.0|".to_vec());
let station = Station::new(link, std::io::sink(), Config::default());
station.start()?;
while station.is_running() {
    std::thread::sleep(std::time::Duration::from_millis(10));
}
station.shutdown()?;
let snap = station.snapshot()?;
assert_eq!(snap.temperature, vec![Some(25.5)]);
# Ok::<(), groundlink::Error>(())
```
 */

pub mod aggregate;
pub mod alarm;
pub mod block;
pub mod command;
pub mod config;
pub mod decoder;
pub mod frame;
pub mod graph;
pub mod message;
pub mod radar;
pub mod sensor;
pub mod station;
pub mod stream;
pub mod telemetry;
pub mod textlog;

/// Float type used for all measurements.
pub type Float = f32;

/// Groundlink error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O error, usually on the satellite link.
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// Error with just a message.
    #[error("{0}")]
    Plain(String),

    /// Error with context.
    #[error("{msg}: {source}")]
    Other {
        /// Context.
        msg: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    /// Create error from message.
    #[must_use]
    pub fn msg<S: Into<String>>(msg: S) -> Self {
        Self::Plain(msg.into())
    }

    /// Wrap an error with some context.
    #[must_use]
    pub fn wrap<E: std::error::Error + Send + Sync + 'static, S: Into<String>>(e: E, msg: S) -> Self {
        Self::Other {
            msg: msg.into(),
            source: Box::new(e),
        }
    }
}

/// Groundlink result.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = Error::wrap(Error::msg("inner"), "outer");
        assert_eq!(e.to_string(), "outer: inner");
        let e: Error = std::io::Error::other("gone").into();
        assert_eq!(e.to_string(), "IO Error: gone");
    }
}
