/*! Graphs contain blocks connected by streams, and run them.

The graph runs on the calling thread. For the ground station that is the
single reader thread owned by [`Station`][crate::station::Station].
 */
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{info, trace};

use crate::block::{Block, BlockRet};
use crate::{Error, Result};

/// Default sleep when no block made any progress.
pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(10);

/**
Cancellation token, for asynchronously stopping a graph.

The graph checks it between iterations, so a block that is blocked in a
read will finish that read first.

# Example

```no_run
let g = groundlink::graph::Graph::new();
let cancel = g.cancel_token();
ctrlc::set_handler(move || {
    cancel.cancel();
}).expect("failed to set Ctrl-C handler");
```
*/
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    inner: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new token, not yet cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the graph.
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }

    /// Has cancel() been called?
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }
}

/**
A graph is a thing that runs blocks until they're all done, or until the
graph is cancelled.

# Example

```
use groundlink::graph::Graph;
use groundlink::frame::FrameSource;
let (src, _frames) = FrameSource::new(std::io::Cursor::new(b"16:0:hi|".to_vec()));
let mut g = Graph::new();
g.add(Box::new(src));
g.run()?;
# Ok::<(), groundlink::Error>(())
```
*/
pub struct Graph {
    blocks: Vec<Box<dyn Block + Send>>,
    cancel_token: CancellationToken,
    idle_sleep: Duration,
    times: Vec<Duration>,
    spent_time: Option<Duration>,
}

impl Graph {
    /// Create a new graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            cancel_token: CancellationToken::new(),
            idle_sleep: DEFAULT_IDLE_SLEEP,
            times: Vec::new(),
            spent_time: None,
        }
    }

    /// Set how long to sleep when no block made progress.
    pub fn set_idle_sleep(&mut self, d: Duration) {
        self.idle_sleep = d;
    }

    /// Use a token created elsewhere, so the owner can cancel the graph
    /// before it's even started.
    pub fn set_cancel_token(&mut self, token: CancellationToken) {
        self.cancel_token = token;
    }

    /// Add a block to the graph.
    pub fn add(&mut self, b: Box<dyn Block + Send>) {
        self.blocks.push(b);
    }

    /// Return a cancellation token for this graph.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Run the graph.
    ///
    /// Runs until all the blocks have returned EOF, or until the graph is
    /// cancelled. The first block error stops the graph and is returned.
    pub fn run(&mut self) -> Result<()> {
        let st = Instant::now();
        self.times.resize(self.blocks.len(), Duration::default());
        let mut eof = vec![false; self.blocks.len()];
        let ret = loop {
            if self.cancel_token.is_canceled() {
                info!("Graph cancelled");
                break Ok(());
            }
            let mut done = true;
            let mut all_idle = true;
            for (n, b) in self.blocks.iter_mut().enumerate() {
                if eof[n] {
                    continue;
                }
                let name = b.block_name();
                let bst = Instant::now();
                let ret = b.work().map_err(|e| Error::wrap(e, format!("in block {name}")));
                self.times[n] += bst.elapsed();
                let ret = match ret {
                    Ok(r) => r,
                    Err(e) => {
                        self.spent_time = Some(st.elapsed());
                        return Err(e);
                    }
                };
                match ret {
                    BlockRet::Again => {
                        done = false;
                        all_idle = false;
                    }
                    BlockRet::Pending | BlockRet::Noop => {
                        done = false;
                    }
                    BlockRet::EOF => {
                        info!("{name} EOF");
                        eof[n] = true;
                    }
                }
            }
            if done {
                break Ok(());
            }
            if all_idle {
                trace!("No progress from any block. Sleeping a bit.");
                std::thread::sleep(self.idle_sleep);
            }
        };
        self.spent_time = Some(st.elapsed());
        if let Some(stats) = self.generate_stats() {
            for line in stats.lines() {
                info!("{line}");
            }
        }
        ret
    }

    /// Return a string with stats about where time went.
    ///
    /// Only available after `run()` has returned.
    #[must_use]
    pub fn generate_stats(&self) -> Option<String> {
        let elapsed = self.spent_time?.as_secs_f64();
        let ml = self
            .blocks
            .iter()
            .map(|b| b.block_name().len())
            .max()
            .unwrap_or(0)
            .max("Elapsed seconds".len());
        let mut s = format!("{:<width$}    Seconds  Percent\n", "Block name", width = ml);
        for (n, b) in self.blocks.iter().enumerate() {
            let t = self.times.get(n).copied().unwrap_or_default().as_secs_f64();
            let pct = if elapsed > 0.0 {
                100.0 * t / elapsed
            } else {
                0.0
            };
            s += &format!(
                "{:<width$} {:10.3} {:7.2}%\n",
                b.block_name(),
                t,
                pct,
                width = ml
            );
        }
        s += &format!("{:<width$} {:10.3}\n", "Elapsed seconds", elapsed, width = ml);
        Some(s)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown {
        left: usize,
        calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Block for Countdown {
        fn block_name(&self) -> &'static str {
            "Countdown"
        }
        fn work(&mut self) -> Result<BlockRet> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.left == 0 {
                return Ok(BlockRet::EOF);
            }
            self.left -= 1;
            Ok(BlockRet::Again)
        }
    }

    struct Failing;

    impl Block for Failing {
        fn block_name(&self) -> &'static str {
            "Failing"
        }
        fn work(&mut self) -> Result<BlockRet> {
            Err(Error::msg("boom"))
        }
    }

    #[test]
    fn runs_until_eof() -> Result<()> {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut g = Graph::new();
        g.add(Box::new(Countdown {
            left: 3,
            calls: calls.clone(),
        }));
        g.run()?;
        assert_eq!(calls.load(Ordering::Relaxed), 4);
        let stats = g.generate_stats().unwrap();
        assert!(stats.contains("Countdown"), "{stats}");
        Ok(())
    }

    #[test]
    fn cancelled_before_start() -> Result<()> {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut g = Graph::new();
        g.add(Box::new(Countdown {
            left: 1000,
            calls: calls.clone(),
        }));
        g.cancel_token().cancel();
        g.run()?;
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        Ok(())
    }

    #[test]
    fn error_stops_graph() {
        let mut g = Graph::new();
        g.add(Box::new(Failing));
        let err = g.run().unwrap_err();
        assert!(err.to_string().contains("in block Failing"), "{err}");
    }
}
