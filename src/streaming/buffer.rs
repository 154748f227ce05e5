// Time-ordered sample buffers for the two CTG channels
//
// Each buffer keeps a `(time, value)` sequence per channel behind a single
// mutex so that readers never observe a channel mid-append. Retention is a
// type parameter: a session feeds one windowed buffer (live display) and one
// retain-all buffer (persistence and classifier export) from the same `add`.

use crate::streaming::export::{write_series_csv, CsvExport};
use crate::streaming::types::{Channel, Sample, Snapshot, StreamResult};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Raw per-channel storage guarded by a `SampleBuffer`'s lock
#[derive(Debug, Default)]
pub struct ChannelSeries {
    bpm: VecDeque<Sample>,
    uterus: VecDeque<Sample>,
    latest_time: f64,
}

impl ChannelSeries {
    fn channel_mut(&mut self, channel: Channel) -> &mut VecDeque<Sample> {
        match channel {
            Channel::Bpm => &mut self.bpm,
            Channel::Uterus => &mut self.uterus,
        }
    }

    fn channel(&self, channel: Channel) -> &VecDeque<Sample> {
        match channel {
            Channel::Bpm => &self.bpm,
            Channel::Uterus => &self.uterus,
        }
    }

    fn push(&mut self, channel: Channel, sample: Sample) {
        self.channel_mut(channel).push_back(sample);
        if sample.time > self.latest_time {
            self.latest_time = sample.time;
        }
    }

    /// Max last-sample time across both channels, 0.0 while empty
    pub fn latest_time(&self) -> f64 {
        self.latest_time
    }

    /// Drop every sample strictly older than `cutoff` from both channels.
    ///
    /// Samples are kept in arrival order, so a late sample can sit behind a
    /// newer one; the whole series is scanned once the front is clean.
    pub fn drop_older_than(&mut self, cutoff: f64) {
        for channel in Channel::ALL {
            let series = self.channel_mut(channel);
            while series.front().is_some_and(|s| s.time < cutoff) {
                series.pop_front();
            }
            if series.iter().any(|s| s.time < cutoff) {
                series.retain(|s| s.time >= cutoff);
            }
        }
    }

    fn collect_since(&self, channel: Channel, cutoff: f64) -> Vec<Sample> {
        self.channel(channel)
            .iter()
            .filter(|s| s.time >= cutoff)
            .copied()
            .collect()
    }
}

/// Eviction rule applied after every `add`
pub trait RetentionPolicy: Send + Sync {
    fn trim(&self, series: &mut ChannelSeries);
}

/// Never drop anything; used for the full session trace
#[derive(Debug, Clone, Copy, Default)]
pub struct RetainAll;

impl RetentionPolicy for RetainAll {
    fn trim(&self, _series: &mut ChannelSeries) {}
}

/// Drop samples older than `latest_time - window_seconds`.
///
/// `latest_time` spans both channels, so the two windows stay aligned even
/// when one channel stalls.
#[derive(Debug, Clone, Copy)]
pub struct Windowed {
    pub window_seconds: f64,
}

impl Windowed {
    pub fn new(window_seconds: f64) -> Self {
        Self { window_seconds }
    }
}

impl RetentionPolicy for Windowed {
    fn trim(&self, series: &mut ChannelSeries) {
        let window_start = (series.latest_time() - self.window_seconds).max(0.0);
        series.drop_older_than(window_start);
    }
}

/// Lock-guarded two-channel sample buffer
pub struct SampleBuffer<P: RetentionPolicy> {
    inner: Mutex<ChannelSeries>,
    policy: P,
}

impl<P: RetentionPolicy> SampleBuffer<P> {
    pub fn new(policy: P) -> Self {
        Self {
            inner: Mutex::new(ChannelSeries::default()),
            policy,
        }
    }

    /// Append a sample and apply the retention policy. Never fails.
    pub fn add(&self, channel: Channel, time: f64, value: f64) {
        let mut series = self.inner.lock();
        series.push(channel, Sample::new(time, value));
        self.policy.trim(&mut series);
    }

    /// Copy both channels as currently stored
    pub fn snapshot(&self) -> Snapshot {
        let series = self.inner.lock();
        Snapshot {
            bpm: series.bpm.iter().copied().collect(),
            uterus: series.uterus.iter().copied().collect(),
            latest_time: series.latest_time(),
        }
    }

    /// Copy only samples with `time >= latest_time - seconds`, regardless of
    /// this buffer's own retention
    pub fn snapshot_window(&self, seconds: f64) -> Snapshot {
        let series = self.inner.lock();
        let latest_time = series.latest_time();
        let cutoff = (latest_time - seconds).max(0.0);
        Snapshot {
            bpm: series.collect_since(Channel::Bpm, cutoff),
            uterus: series.collect_since(Channel::Uterus, cutoff),
            latest_time,
        }
    }

    /// Serialize both channels as `time,value` CSV in stored order
    pub fn to_csv(&self) -> StreamResult<CsvExport> {
        let series = self.inner.lock();
        Ok(CsvExport {
            bpm: write_series_csv(series.bpm.iter())?,
            uterus: write_series_csv(series.uterus.iter())?,
        })
    }

    pub fn len(&self, channel: Channel) -> usize {
        self.inner.lock().channel(channel).len()
    }

    pub fn is_empty(&self) -> bool {
        let series = self.inner.lock();
        series.bpm.is_empty() && series.uterus.is_empty()
    }

    pub fn latest_time(&self) -> f64 {
        self.inner.lock().latest_time()
    }

    pub fn clear(&self) {
        *self.inner.lock() = ChannelSeries::default();
    }
}

/// The pair of buffers a session feeds from every ingested sample
pub struct SessionBuffers {
    /// Short windowed view for live display
    pub live: SampleBuffer<Windowed>,
    /// Full session trace for persistence and export
    pub full: SampleBuffer<RetainAll>,
}

impl SessionBuffers {
    pub fn new(window_seconds: f64) -> Self {
        Self {
            live: SampleBuffer::new(Windowed::new(window_seconds)),
            full: SampleBuffer::new(RetainAll),
        }
    }

    pub fn add(&self, channel: Channel, time: f64, value: f64) {
        self.full.add(channel, time, value);
        self.live.add(channel, time, value);
    }

    pub fn window_seconds(&self) -> f64 {
        self.live.policy.window_seconds
    }
}
