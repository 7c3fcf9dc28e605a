//! Background persistence of dirty pages.
//!
//! Two loops share one [`BufferPoolManager`]:
//!
//! - **writer**: right away and then every `writer_interval`, flushes at
//!   most `max_pages_per_cycle` dirty pages, oldest first, and leaves the rest
//!   for the next cycle.
//! - **checkpointer**: every `checkpoint_interval`, flushes everything.
//!
//! A failed cycle is logged and the loop keeps going. Both loops watch a
//! stop signal between sleeps; [`DirtyPageWriter::shutdown`] raises it,
//! joins the threads and drains the pool with one final full flush.

use crate::storage::buffer::BufferPoolManager;
use crate::storage::error::{StorageError, StorageResult};
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    pub writer_interval: Duration,
    pub checkpoint_interval: Duration,
    pub max_pages_per_cycle: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            writer_interval: Duration::from_secs(1),
            checkpoint_interval: Duration::from_secs(10),
            max_pages_per_cycle: 100,
        }
    }
}

/// Stop flag that sleeping loops can wait on.
#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    fn stop(&self) {
        *self.stopped.lock() = true;
        self.condvar.notify_all();
    }

    /// Sleeps for `timeout` unless stopped first. Returns true once stopped.
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.condvar.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// Flushes up to `max_pages` dirty pages, oldest first. Returns how many
/// were written.
pub fn run_writer_cycle(pool: &BufferPoolManager, max_pages: usize) -> StorageResult<usize> {
    let mut flushed = 0;
    for page_id in pool.get_dirty_pages().into_iter().take(max_pages) {
        if pool.flush_page(page_id)? {
            flushed += 1;
        }
    }
    Ok(flushed)
}

/// Flushes every dirty page in the pool.
pub fn run_checkpoint(pool: &BufferPoolManager) -> StorageResult<usize> {
    pool.flush_all_pages()
}

pub struct DirtyPageWriter {
    pool: BufferPoolManager,
    signal: Arc<StopSignal>,
    handles: Vec<JoinHandle<()>>,
}

impl DirtyPageWriter {
    /// Spawns the writer and checkpointer threads. The writer runs its first
    /// cycle right away; the checkpointer waits one interval.
    pub fn start(pool: BufferPoolManager, config: WriterConfig) -> StorageResult<Self> {
        let signal = Arc::new(StopSignal::default());
        let mut writer = Self {
            pool: pool.clone(),
            signal: signal.clone(),
            handles: Vec::with_capacity(2),
        };

        {
            let pool = pool.clone();
            let signal = signal.clone();
            writer.spawn("dirty-page-writer", move || loop {
                match run_writer_cycle(&pool, config.max_pages_per_cycle) {
                    Ok(0) => {}
                    Ok(n) => debug!("background writer flushed {} pages", n),
                    Err(e) => warn!("background writer cycle failed: {}", e),
                }
                if signal.wait(config.writer_interval) {
                    break;
                }
            })?;
        }

        writer.spawn("checkpointer", move || {
            while !signal.wait(config.checkpoint_interval) {
                match run_checkpoint(&pool) {
                    Ok(n) => info!("checkpoint flushed {} pages", n),
                    Err(e) => warn!("checkpoint failed: {}", e),
                }
            }
        })?;

        info!(
            "dirty page writer started (every {:?}, up to {} pages; checkpoint every {:?})",
            config.writer_interval, config.max_pages_per_cycle, config.checkpoint_interval
        );

        Ok(writer)
    }

    /// Spawns one background loop. On failure the loops already running are
    /// stopped and joined before the error is returned.
    fn spawn<F>(&mut self, name: &str, body: F) -> StorageResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        match thread::Builder::new().name(name.to_string()).spawn(body) {
            Ok(handle) => {
                self.handles.push(handle);
                Ok(())
            }
            Err(e) => Err(self.abort_start(e)),
        }
    }

    fn abort_start(&mut self, e: io::Error) -> StorageError {
        warn!("failed to spawn background flush thread: {}", e);
        self.stop_and_join();
        e.into()
    }

    /// Stops both loops, waits for them, and flushes every remaining dirty
    /// page.
    pub fn shutdown(mut self) -> StorageResult<usize> {
        self.stop_and_join();
        let flushed = self.pool.flush_all_pages()?;
        info!("dirty page writer stopped, final drain flushed {} pages", flushed);
        Ok(flushed)
    }

    fn stop_and_join(&mut self) {
        self.signal.stop();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("background flush thread panicked");
            }
        }
    }
}

impl Drop for DirtyPageWriter {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        self.stop_and_join();
        // Best effort drain on drop
        if let Err(e) = self.pool.flush_all_pages() {
            warn!("final drain failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::buffer::lru::LruReplacer;
    use crate::storage::page::{HeapPage, Page, PageId};
    use crate::storage::PageFileManager;
    use anyhow::Result;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::{tempdir, TempDir};

    fn dirty_pool(capacity: usize, dirty: u32) -> Result<(BufferPoolManager, TempDir)> {
        let dir = tempdir()?;
        let pool = BufferPoolManager::new(
            capacity,
            PageFileManager::new(),
            Box::new(LruReplacer::new()),
            dir.path().join("writer.db"),
        );
        for i in 0..dirty {
            let page_id = PageId(i);
            pool.get_page(page_id)?;
            let mut page = HeapPage::new(page_id);
            page.write(&i.to_le_bytes())?;
            pool.update_page(page_id, page)?;
        }
        Ok((pool, dir))
    }

    #[test]
    fn test_writer_cycle_is_bounded() -> Result<()> {
        let (pool, _dir) = dirty_pool(200, 150)?;
        assert_eq!(pool.get_dirty_pages().len(), 150);

        assert_eq!(run_writer_cycle(&pool, 100)?, 100);
        let remaining = pool.get_dirty_pages();
        assert_eq!(remaining.len(), 50);
        // Oldest went first
        assert_eq!(remaining[0], PageId(100));

        assert_eq!(run_checkpoint(&pool)?, 50);
        assert!(pool.get_dirty_pages().is_empty());

        Ok(())
    }

    #[test]
    fn test_stop_signal_wakes_sleeper() {
        let signal = Arc::new(StopSignal::default());
        assert!(!signal.wait(Duration::from_millis(1)));

        let sleeper = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait(Duration::from_secs(60)))
        };
        thread::sleep(Duration::from_millis(20));
        signal.stop();

        assert!(sleeper.join().unwrap());
    }

    #[test]
    fn test_background_writer_flushes() -> Result<()> {
        let (pool, _dir) = dirty_pool(10, 3)?;
        let config = WriterConfig {
            writer_interval: Duration::from_millis(20),
            checkpoint_interval: Duration::from_secs(60),
            max_pages_per_cycle: 100,
        };

        let writer = DirtyPageWriter::start(pool.clone(), config)?;
        let deadline = Instant::now() + Duration::from_secs(5);
        while !pool.get_dirty_pages().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(pool.get_dirty_pages().is_empty());

        writer.shutdown()?;
        Ok(())
    }

    #[test]
    fn test_shutdown_drains() -> Result<()> {
        let (pool, _dir) = dirty_pool(10, 5)?;
        let config = WriterConfig {
            writer_interval: Duration::from_secs(60),
            checkpoint_interval: Duration::from_secs(60),
            max_pages_per_cycle: 1,
        };

        let writer = DirtyPageWriter::start(pool.clone(), config)?;
        let started = Instant::now();
        // The writer's first cycle took one page, the drain takes the rest
        assert_eq!(writer.shutdown()?, 4);

        // Sleeping loops were woken, not waited out
        assert!(started.elapsed() < Duration::from_secs(30));
        assert!(pool.get_dirty_pages().is_empty());

        let on_disk = PageFileManager::new().read(PageId(4), pool.path())?;
        assert_eq!(on_disk.read(0)?, &4u32.to_le_bytes());

        Ok(())
    }

    fn wait_until_clean(pool: &BufferPoolManager, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !pool.get_dirty_pages().is_empty() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    #[test]
    fn test_first_cycle_runs_at_start() -> Result<()> {
        let (pool, _dir) = dirty_pool(10, 3)?;
        let config = WriterConfig {
            writer_interval: Duration::from_secs(60),
            checkpoint_interval: Duration::from_secs(60),
            max_pages_per_cycle: 100,
        };

        let writer = DirtyPageWriter::start(pool.clone(), config)?;
        assert!(wait_until_clean(&pool, Duration::from_secs(5)));

        assert_eq!(writer.shutdown()?, 0);
        Ok(())
    }

    #[test]
    fn test_writer_survives_failed_cycles() -> Result<()> {
        let dir = tempdir()?;
        let missing = dir.path().join("missing");
        let pool = BufferPoolManager::new(
            10,
            PageFileManager::new(),
            Box::new(LruReplacer::new()),
            missing.join("x.db"),
        );
        for _ in 0..3 {
            pool.new_page()?;
        }
        let config = WriterConfig {
            writer_interval: Duration::from_millis(10),
            checkpoint_interval: Duration::from_secs(60),
            max_pages_per_cycle: 100,
        };

        let writer = DirtyPageWriter::start(pool.clone(), config)?;
        // Every flush fails while the directory is missing
        thread::sleep(Duration::from_millis(50));
        assert_eq!(pool.get_dirty_pages().len(), 3);

        std::fs::create_dir(&missing)?;
        assert!(wait_until_clean(&pool, Duration::from_secs(5)));
        assert_eq!(PageFileManager::new().num_pages(pool.path())?, 3);

        writer.shutdown()?;
        Ok(())
    }

    #[test]
    fn test_failed_start_stops_running_loops() -> Result<()> {
        let (pool, _dir) = dirty_pool(4, 0)?;
        let signal = Arc::new(StopSignal::default());
        let mut writer = DirtyPageWriter {
            pool,
            signal: signal.clone(),
            handles: Vec::new(),
        };

        let exited = Arc::new(AtomicBool::new(false));
        {
            let exited = exited.clone();
            writer.spawn("idle-loop", move || {
                while !signal.wait(Duration::from_secs(60)) {}
                exited.store(true, Ordering::SeqCst);
            })?;
        }

        let err = writer.abort_start(io::Error::new(io::ErrorKind::Other, "no threads"));
        assert!(matches!(err, StorageError::Io(_)));
        assert!(writer.handles.is_empty());
        assert!(exited.load(Ordering::SeqCst));

        Ok(())
    }
}
