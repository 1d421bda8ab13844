//! Duty-cycled reading of receiver lines into the device registry
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::{SchedulerError, SourceError};
use crate::jeelink::{decode_with, DecodeOptions, LineSource, SourceOpener};
use crate::registry::{AdmissionPolicy, DeviceRegistry};
use crate::scheduler::settings::{ScheduleSettings, ThrottleMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Reading,
    Paused,
    Stopped,
}

/// Counters over one scheduler run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Lines taken from the source
    pub received: u64,
    /// Lines handed to the decoder
    pub admitted: u64,
    /// Lines thrown away while paused
    pub dropped: u64,
    /// Lines the decoder rejected
    pub rejected: u64,
    /// Readings of devices the admission policy refused
    pub denied: u64,
    /// Readings stored in the registry
    pub committed: u64,
    pub evicted: u64,
    /// Times the source was reopened after failing
    pub reopened: u64,
}

/// Single owner of the line source and the device registry
pub struct ReadScheduler<O: SourceOpener, P: AdmissionPolicy> {
    opener: O,
    registry: DeviceRegistry,
    policy: P,
    decode_options: DecodeOptions,
    settings: ScheduleSettings,
    state: SchedulerState,
    stats: ReadStats,
}

async fn next_line<S: LineSource>(
    source: &mut Option<S>,
) -> Option<Result<Vec<u8>, SourceError>> {
    match source {
        Some(source) => source.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// The line source and, while it is down, when to try opening it again
struct Link<S> {
    source: Option<S>,
    retry_at: Option<Instant>,
    backoff: Duration,
    recovering: bool,
}

impl<O: SourceOpener, P: AdmissionPolicy> ReadScheduler<O, P> {
    pub fn new(
        opener: O,
        registry: DeviceRegistry,
        policy: P,
        decode_options: DecodeOptions,
        settings: ScheduleSettings,
    ) -> Self {
        ReadScheduler {
            opener,
            registry,
            policy,
            decode_options,
            settings,
            state: SchedulerState::Reading,
            stats: ReadStats::default(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Read until `shutdown` resolves or the source is lost for good.
    ///
    /// The scheduler ends in `Stopped` either way; once stopped it never
    /// reads again.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<ReadStats, SchedulerError>
    where
        F: Future<Output = ()>,
    {
        if self.state == SchedulerState::Stopped {
            return Ok(self.stats);
        }

        tokio::pin!(shutdown);
        let result = self.read_loop(shutdown).await;
        self.state = SchedulerState::Stopped;
        self.log_summary();

        result.map(|()| self.stats)
    }

    /// Every timer lives in one `select!`, so the sweep keeps running while
    /// the source is paused, closed or waiting to be reopened.
    async fn read_loop<F>(&mut self, mut shutdown: Pin<&mut F>) -> Result<(), SchedulerError>
    where
        F: Future<Output = ()>,
    {
        let mut link = Link {
            source: None,
            retry_at: None,
            backoff: self.settings.reopen.initial_backoff,
            recovering: false,
        };

        self.state = SchedulerState::Reading;
        self.try_open(&mut link)?;

        if self.settings.debug {
            info!("Debug mode: reading continuously");
        } else {
            debug!("Reading for {:?}", self.settings.interval);
        }

        let mut phase_deadline = Instant::now() + self.settings.interval;
        let sweep_period = self.settings.sweep_period;
        let mut sweep = time::interval_at(Instant::now() + sweep_period, sweep_period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let throttled = !self.settings.debug;

            tokio::select! {
                biased;

                _ = shutdown.as_mut() => {
                    info!("Shutdown requested, closing line source");
                    return Ok(());
                }
                _ = sweep.tick() => {
                    let evicted = self.registry.sweep(Instant::now());
                    self.stats.evicted += evicted.len() as u64;
                }
                _ = time::sleep_until(phase_deadline), if throttled => {
                    match self.state {
                        SchedulerState::Reading => self.pause(&mut link),
                        SchedulerState::Paused => self.resume(&mut link)?,
                        SchedulerState::Stopped => return Ok(()),
                    }
                    phase_deadline = Instant::now() + self.settings.interval;
                }
                _ = wait_until(link.retry_at) => {
                    link.retry_at = None;
                    self.try_open(&mut link)?;
                }
                line = next_line(&mut link.source) => match line {
                    Some(Ok(line)) => self.handle_line(&line),
                    Some(Err(e)) => {
                        error!("Serial read failed: {}", e);
                        self.source_lost(&mut link)?;
                    }
                    None => {
                        error!("Serial port closed. Was that intentional?");
                        self.source_lost(&mut link)?;
                    }
                },
            }
        }
    }

    /// Forward one line to the decoder and registry, unless paused
    fn handle_line(&mut self, line: &[u8]) {
        self.stats.received += 1;

        if self.state != SchedulerState::Reading {
            self.stats.dropped += 1;
            return;
        }

        self.stats.admitted += 1;
        debug!("received: {}", String::from_utf8_lossy(line));

        let reading = match decode_with(line, &self.decode_options) {
            Ok(reading) => reading,
            Err(e) => {
                debug!("Ignoring line {:?}: {}", String::from_utf8_lossy(line), e);
                self.stats.rejected += 1;
                return;
            }
        };

        let Some(identity) = reading.identity() else {
            self.stats.rejected += 1;
            return;
        };

        match self.registry.upsert(identity, reading, &self.policy) {
            Some(_) => self.stats.committed += 1,
            None => {
                debug!("Device not configured: {}", identity);
                self.stats.denied += 1;
            }
        }
    }

    fn pause(&mut self, link: &mut Link<O::Source>) {
        self.state = SchedulerState::Paused;

        match self.settings.throttle {
            ThrottleMode::Drain => {
                debug!("Discarding lines for {:?}", self.settings.interval);
            }
            ThrottleMode::Reopen => {
                // Opened again on resume, a pending retry would only race it
                link.source = None;
                link.retry_at = None;
                debug!(
                    "Closed line source, waiting for {:?}",
                    self.settings.interval
                );
            }
        }
    }

    /// Start a new reading window
    fn resume(&mut self, link: &mut Link<O::Source>) -> Result<(), SchedulerError> {
        self.state = SchedulerState::Reading;
        debug!("Reading for {:?}", self.settings.interval);

        if link.source.is_none() && link.retry_at.is_none() {
            self.try_open(link)?;
        }

        // Whatever queued up during the pause is stale
        if let Some(source) = link.source.as_mut() {
            if let Err(e) = source.discard_pending() {
                warn!("Could not flush line source: {}", e);
            }
        }
        Ok(())
    }

    /// Drop a failed or closed source and schedule the first retry
    fn source_lost(&mut self, link: &mut Link<O::Source>) -> Result<(), SchedulerError> {
        link.source = None;

        let reopen = self.settings.reopen;
        if !reopen.enabled {
            return Err(SchedulerError::SourceClosed);
        }

        info!("Reopening line source in {:?}", reopen.initial_backoff);
        link.recovering = true;
        link.retry_at = Some(Instant::now() + reopen.initial_backoff);
        link.backoff = reopen.initial_backoff;
        Ok(())
    }

    /// Open the source once. On failure the next attempt is scheduled with
    /// exponential backoff, or the error is returned when reopening is off.
    fn try_open(&mut self, link: &mut Link<O::Source>) -> Result<(), SchedulerError> {
        let reopen = self.settings.reopen;

        match self.opener.open() {
            Ok(source) => {
                if link.recovering {
                    self.stats.reopened += 1;
                    link.recovering = false;
                }
                link.source = Some(source);
                link.backoff = reopen.initial_backoff;
                Ok(())
            }
            Err(e) if reopen.enabled => {
                error!(
                    "Failed to open line source: {}. Retrying in {:?}",
                    e, link.backoff
                );
                link.retry_at = Some(Instant::now() + link.backoff);
                link.backoff = reopen.next_backoff(link.backoff);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn log_summary(&self) {
        let stats = &self.stats;
        info!("Reader stopped with {} known devices", self.registry.len());
        info!("  Lines received: {}", stats.received);
        info!("  Lines admitted: {}", stats.admitted);
        info!("  Lines dropped while paused: {}", stats.dropped);
        info!("  Lines rejected by decoder: {}", stats.rejected);
        info!("  Readings committed: {}", stats.committed);
        info!("  Readings from unknown devices: {}", stats.denied);
        info!("  Devices evicted: {}", stats.evicted);
        info!("  Source reopened: {} times", stats.reopened);
    }
}
