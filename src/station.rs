/*! Ground station: the decoder, its state, and its reader thread.

A [`Station`] owns the link to the satellite. There is at most one reader
thread, started by the first [`start()`][Station::start] or
[`resume()`][Station::resume]. It runs a two block graph:

```text
  [ FrameSource ]  byte stream -> frames
         ↓
    [ Decoder ]    frames -> Telemetry, alarms -> CommandWriter
```

Anyone holding the station (or an `Arc` of it) can take snapshots and send
commands concurrently with the reader.

# Example

```
use groundlink::station::Station;
use groundlink::config::Config;
let link = std::io::Cursor::new(b"16:0:Hello|16:3:0:45:80.0|".to_vec());
let st = Station::new(link, std::io::sink(), Config::default());
st.start()?;
st.shutdown()?;
# Ok::<(), groundlink::Error>(())
```
*/
use std::io::Read;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::Float;
use crate::aggregate::Mode;
use crate::command::{Command, CommandWriter};
use crate::config::Config;
use crate::decoder::Decoder;
use crate::frame::FrameSource;
use crate::graph::{CancellationToken, Graph};
use crate::telemetry::{Snapshot, Telemetry};
use crate::{Error, Result};

enum Reader {
    /// Not yet started. Holds the byte source.
    Idle(Box<dyn Read + Send>),
    /// Reader thread started.
    Running {
        handle: JoinHandle<Result<()>>,
        cancel: CancellationToken,
    },
    /// Reader thread has been joined. The byte source is gone.
    Stopped,
}

/// Ground station.
pub struct Station {
    telemetry: Arc<Mutex<Telemetry>>,
    commands: CommandWriter,
    reader: Mutex<Reader>,
    idle_backoff: Duration,
    // Used to unblock a reader stuck in a TCP read on shutdown.
    tcp: Option<TcpStream>,
}

impl Station {
    /// Create a new station on a link, given as its read and write halves.
    pub fn new<R, W>(reader: R, writer: W, config: Config) -> Self
    where
        R: Read + Send + 'static,
        W: std::io::Write + Send + 'static,
    {
        Self {
            telemetry: Arc::new(Mutex::new(Telemetry::new(&config))),
            commands: CommandWriter::new(writer),
            reader: Mutex::new(Reader::Idle(Box::new(reader))),
            idle_backoff: config.idle_backoff,
            tcp: None,
        }
    }

    /// Create a new station talking to a serial-over-TCP bridge.
    pub fn connect_tcp<A: ToSocketAddrs + std::fmt::Debug>(addr: A, config: Config) -> Result<Self> {
        let stream = TcpStream::connect(&addr)
            .map_err(|e| Error::wrap(e, format!("connecting to {addr:?}")))?;
        info!("Connected to {:?}", stream.peer_addr()?);
        let mut st = Self::new(stream.try_clone()?, stream.try_clone()?, config);
        st.tcp = Some(stream);
        Ok(st)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Telemetry>> {
        self.telemetry
            .lock()
            .map_err(|e| Error::msg(format!("telemetry lock poisoned: {e}")))
    }

    fn lock_reader(&self) -> Result<MutexGuard<'_, Reader>> {
        self.reader
            .lock()
            .map_err(|e| Error::msg(format!("reader lock poisoned: {e}")))
    }

    /// Start the reader thread, unless it's already running.
    fn ensure_reader(&self) -> Result<()> {
        let mut reader = self.lock_reader()?;
        match std::mem::replace(&mut *reader, Reader::Stopped) {
            Reader::Idle(src) => {
                let cancel = CancellationToken::new();
                let telemetry = self.telemetry.clone();
                let commands = self.commands.clone();
                let idle = self.idle_backoff;
                let token = cancel.clone();
                let handle = std::thread::Builder::new()
                    .name("groundlink-reader".to_string())
                    .spawn(move || -> Result<()> {
                        let (src, frames) = FrameSource::new(src);
                        let mut g = Graph::new();
                        g.set_cancel_token(token);
                        g.set_idle_sleep(idle);
                        g.add(Box::new(src));
                        g.add(Box::new(Decoder::new(frames, telemetry, commands)));
                        let ret = g.run();
                        match &ret {
                            Ok(()) => info!("Reader finished"),
                            Err(e) => error!("Reader stopped: {e}"),
                        }
                        ret
                    })?;
                info!("Reader started");
                *reader = Reader::Running { handle, cancel };
                Ok(())
            }
            running @ Reader::Running { .. } => {
                *reader = running;
                Ok(())
            }
            Reader::Stopped => Err(Error::msg("reader has been shut down")),
        }
    }

    /// Start collecting, and start the reader if not running.
    ///
    /// The first call sets time zero for sample timestamps. Calling it while
    /// already running only re-enables collection.
    pub fn start(&self) -> Result<()> {
        self.lock()?.start(Instant::now());
        self.ensure_reader()?;
        self.commands.send(&Command::Start)
    }

    /// Pause collecting. The reader keeps running, and samples received while
    /// paused are recorded as gaps.
    pub fn pause(&self) -> Result<()> {
        self.lock()?.pause();
        self.commands.send(&Command::Pause)
    }

    /// Resume collecting, starting the reader if needed.
    pub fn resume(&self) -> Result<()> {
        self.lock()?.resume();
        self.ensure_reader()?;
        self.commands.send(&Command::Resume)
    }

    /// Is the reader thread running?
    ///
    /// False before the first start, and after the byte stream closed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        match self.reader.lock().as_deref() {
            Ok(Reader::Running { handle, .. }) => !handle.is_finished(),
            _ => false,
        }
    }

    /// Stop the reader and wait for it.
    ///
    /// The reader checks for cancellation between frames. A reader blocked
    /// on a read only notices once the read returns, except on TCP links,
    /// which are shut down to unblock it.
    ///
    /// Returns the reader's own result, e.g. an I/O error that stopped it.
    pub fn shutdown(&self) -> Result<()> {
        let mut reader = self.lock_reader()?;
        let Reader::Running { handle, cancel } = std::mem::replace(&mut *reader, Reader::Stopped)
        else {
            return Ok(());
        };
        cancel.cancel();
        if let Some(tcp) = &self.tcp
            && let Err(e) = tcp.shutdown(Shutdown::Both)
        {
            warn!("Failed to shut down TCP link: {e}");
        }
        handle
            .join()
            .map_err(|_| Error::msg("reader thread panicked"))?
    }

    /// Send a command to the satellite.
    pub fn send(&self, cmd: &Command) -> Result<()> {
        self.commands.send(cmd)
    }

    /// Change averaging mode, here and on the satellite.
    pub fn set_mode(&self, mode: Mode) -> Result<()> {
        self.lock()?.set_mode(mode);
        self.commands.send(&Command::Mode(mode))
    }

    /// Change the alarm threshold.
    pub fn set_threshold(&self, t: Float) -> Result<()> {
        self.lock()?.set_threshold(t);
        Ok(())
    }

    /// Change the number of radar points kept.
    pub fn set_radar_window(&self, n: usize) -> Result<()> {
        self.lock()?.set_radar_window(n);
        Ok(())
    }

    /// Change the radar scale shrink margin.
    pub fn set_shrink_margin(&self, m: Float) -> Result<()> {
        self.lock()?.set_shrink_margin(m);
        Ok(())
    }

    /// Change the radar scale shrink cooldown.
    pub fn set_shrink_cooldown(&self, d: Duration) -> Result<()> {
        self.lock()?.set_shrink_cooldown(d);
        Ok(())
    }

    /// Change whether sensor values are forgotten after each packet.
    pub fn set_clear_on_finalize(&self, clear: bool) -> Result<()> {
        self.lock()?.set_clear_on_finalize(clear);
        Ok(())
    }

    /// Copy out the current state.
    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.lock()?.snapshot(Instant::now()))
    }
}

impl Drop for Station {
    fn drop(&mut self) {
        if let Ok(Reader::Running { cancel, .. }) = self.reader.get_mut() {
            cancel.cancel();
        }
    }
}
