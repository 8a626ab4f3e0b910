//! The binary log facade.
//!
//! Owns the transport handles (one producer, one consumer), the registered
//! listener set and the polling worker. Producers append through this type
//! from arbitrary threads; each synchronous append blocks its caller until
//! the transport acknowledges the assigned position and never interacts with
//! the polling worker beyond the fault check.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::batch::BatchAssembler;
use super::channel::{default_channels, LogChannel, MEMORY_UPLOAD_CHANNEL};
use super::packet::{Packet, UnitPayload};
use super::poll::PollingThread;
use super::watermark;
use crate::config::BinaryLogConfig;
use crate::data::{ChannelId, DataListener, LogListener};
use crate::error::{BinaryLogError, Result};
use crate::model::{
    ImportJob, LanguageDirection, LanguageIndex, Memory, ParallelCorpus, StringPair,
};
use crate::processing::{TextProcessor, WordAligner};
use crate::transport::{LogConsumer, LogProducer, LogTransport};

/// Connection lifecycle of a [`BinaryLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Closed,
}

/// Public entry point of the distribution layer.
pub struct BinaryLog {
    config: BinaryLogConfig,
    channels: [LogChannel; 2],
    transport: Arc<dyn LogTransport>,
    languages: LanguageIndex,
    processor: Option<Arc<dyn TextProcessor>>,
    aligner: Option<Arc<dyn WordAligner>>,

    state: Mutex<ConnectionState>,
    listeners: Mutex<Vec<Arc<dyn DataListener>>>,
    log_listener: Arc<Mutex<Option<Arc<dyn LogListener>>>>,
    /// First fatal condition recorded by the polling worker.
    fault: Arc<Mutex<Option<String>>>,
    producer: Mutex<Option<Arc<dyn LogProducer>>>,
    polling: Mutex<Option<PollingThread>>,
}

impl BinaryLog {
    /// Create a disconnected binary log. `processor` and `aligner` may be
    /// absent on nodes that never enrich (pure producers); a consumer
    /// requesting enrichment on such a node fails the batch.
    pub fn new(
        config: BinaryLogConfig,
        transport: Arc<dyn LogTransport>,
        languages: LanguageIndex,
        processor: Option<Arc<dyn TextProcessor>>,
        aligner: Option<Arc<dyn WordAligner>>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(BinaryLogError::Configuration)?;

        let channels = default_channels(config.name.as_deref());

        Ok(BinaryLog {
            config,
            channels,
            transport,
            languages,
            processor,
            aligner,
            state: Mutex::new(ConnectionState::Disconnected),
            listeners: Mutex::new(Vec::new()),
            log_listener: Arc::new(Mutex::new(None)),
            fault: Arc::new(Mutex::new(None)),
            producer: Mutex::new(None),
            polling: Mutex::new(None),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn channels(&self) -> &[LogChannel; 2] {
        &self.channels
    }

    pub fn channel(&self, id: ChannelId) -> Result<&LogChannel> {
        self.channels
            .iter()
            .find(|c| c.id() == id)
            .ok_or(BinaryLogError::UnknownChannel(id))
    }

    /// Add a listener to the fan-out set. The set is fixed once connected;
    /// registering afterwards would race the running fan-out.
    pub fn register_listener(&self, listener: Arc<dyn DataListener>) -> Result<()> {
        let state = self.state.lock();
        if *state != ConnectionState::Disconnected {
            return Err(BinaryLogError::InvalidState(format!(
                "listeners must be registered before connect(), state is {:?}",
                *state
            )));
        }
        self.listeners.lock().push(listener);
        Ok(())
    }

    /// Install the observer notified after every delivered batch.
    pub fn set_log_listener(&self, listener: Arc<dyn LogListener>) {
        *self.log_listener.lock() = Some(listener);
    }

    /// Connect producer and consumer sides with the configured timeout.
    pub fn connect(&self) -> Result<Option<HashMap<ChannelId, i64>>> {
        self.connect_with(self.config.connect_timeout(), true, true)
    }

    /// Establish the transport connection.
    ///
    /// With `enable_consumer`, every channel is sought to the aggregate
    /// watermark of the registered listeners and the polling worker is
    /// started; the returned map holds each channel's tail position at
    /// connect time. With only `enable_producer`, returns `None`.
    pub fn connect_with(
        &self,
        timeout: Duration,
        enable_producer: bool,
        enable_consumer: bool,
    ) -> Result<Option<HashMap<ChannelId, i64>>> {
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Disconnected {
                return Err(BinaryLogError::InvalidState(format!(
                    "connect() in state {:?}",
                    *state
                )));
            }
            *state = ConnectionState::Connecting;
        }

        let result = self.try_connect(timeout, enable_producer, enable_consumer);

        let mut state = self.state.lock();
        *state = match result {
            Ok(_) => ConnectionState::Connected,
            Err(_) => ConnectionState::Disconnected,
        };

        result
    }

    fn try_connect(
        &self,
        timeout: Duration,
        enable_producer: bool,
        enable_consumer: bool,
    ) -> Result<Option<HashMap<ChannelId, i64>>> {
        if enable_producer {
            let producer = self.transport.open_producer()?;
            *self.producer.lock() = Some(Arc::from(producer));
        }

        if !enable_consumer {
            return Ok(None);
        }

        let channel_ids: Vec<ChannelId> = self.channels.iter().map(LogChannel::id).collect();
        let listeners = self.listeners.lock().clone();
        let resume = watermark::aggregate_positions(&listeners, &channel_ids);

        // The transport client offers no bounded connect, so the attempt
        // runs on a helper thread and the caller gives up after the timeout.
        let (outcome_tx, outcome_rx) = bounded(1);
        let transport = self.transport.clone();
        let seek_channels = channel_ids.clone();
        thread::Builder::new()
            .name("binlog-connect".to_string())
            .spawn(move || {
                let outcome = open_and_seek(transport.as_ref(), &seek_channels, &resume);
                let _ = outcome_tx.send(outcome);
            })?;

        let (consumer, tails) = match outcome_rx.recv_timeout(timeout) {
            Ok(outcome) => outcome?,
            Err(_) => {
                warn!(timeout = ?timeout, "connection attempt timed out");
                return Err(BinaryLogError::HostUnreachable {
                    hosts: self.config.hosts.clone(),
                    port: self.config.port,
                });
            }
        };

        let consumer: Arc<dyn LogConsumer> = Arc::from(consumer);
        let assembler = BatchAssembler::new(
            self.languages.clone(),
            self.processor.clone(),
            self.aligner.clone(),
        );
        let polling = PollingThread::spawn(
            consumer,
            listeners,
            self.log_listener.clone(),
            assembler,
            self.fault.clone(),
        )?;
        *self.polling.lock() = Some(polling);

        Ok(Some(tails))
    }

    /// Upload a whole corpus into `channel`.
    ///
    /// The first and last pair are appended synchronously to capture the
    /// import's begin and end positions, everything in between is
    /// fire-and-forget. Returns `None` for an empty corpus.
    pub fn upload_corpus(
        &self,
        memory: &Memory,
        corpus: &dyn ParallelCorpus,
        channel: ChannelId,
    ) -> Result<Option<ImportJob>> {
        let channel = self.channel(channel)?.clone();

        debug!(memory = memory.id, corpus = corpus.name(), "uploading memory");

        let mut reader = corpus
            .content_reader()
            .map_err(|source| BinaryLogError::CorpusRead {
                memory: memory.id,
                source,
            })?;
        let mut read = |memory: i64| -> Result<Option<StringPair>> {
            reader
                .read()
                .map_err(|source| BinaryLogError::CorpusRead { memory, source })
        };

        let first = match read(memory.id)? {
            Some(pair) => pair,
            None => return Ok(None),
        };

        let begin = self.append(addition(memory, &first, None), true, &channel)?;
        let mut end = begin;
        let mut size = 1usize;

        let mut pending = read(memory.id)?;
        while let Some(pair) = pending {
            pending = read(memory.id)?;

            let last = pending.is_none();
            let position = self.append(addition(memory, &pair, None), last, &channel)?;
            if last {
                end = position;
            }
            size += 1;
        }

        debug!(
            memory = memory.id,
            begin, end, size, "memory uploaded"
        );

        Ok(Some(ImportJob::new(memory.id, channel.id(), begin, end, size)))
    }

    /// Append a single translation unit and block until it is persisted.
    #[allow(clippy::too_many_arguments)]
    pub fn upload(
        &self,
        direction: LanguageDirection,
        memory: &Memory,
        sentence: &str,
        translation: &str,
        tuid: Option<Uuid>,
        timestamp: Option<DateTime<Utc>>,
        channel: ChannelId,
    ) -> Result<ImportJob> {
        let channel = self.channel(channel)?.clone();

        let packet = Packet::addition(UnitPayload {
            direction,
            owner: memory.owner,
            memory: memory.id,
            tuid,
            sentence: sentence.to_string(),
            translation: translation.to_string(),
            timestamp,
        });

        let position = self.append(packet, true, &channel)?;
        Ok(ImportJob::ephemeral(memory.id, position, channel.id()))
    }

    /// Replace the unit previously stored with exactly `previous_sentence`
    /// and `previous_translation`.
    #[allow(clippy::too_many_arguments)]
    pub fn replace_by_value(
        &self,
        direction: LanguageDirection,
        memory: &Memory,
        sentence: &str,
        translation: &str,
        previous_sentence: &str,
        previous_translation: &str,
        timestamp: Option<DateTime<Utc>>,
        channel: ChannelId,
    ) -> Result<ImportJob> {
        let channel = self.channel(channel)?.clone();

        let packet = Packet::overwrite_by_value(
            UnitPayload {
                direction,
                owner: memory.owner,
                memory: memory.id,
                tuid: None,
                sentence: sentence.to_string(),
                translation: translation.to_string(),
                timestamp,
            },
            previous_sentence,
            previous_translation,
        );

        let position = self.append(packet, true, &channel)?;
        Ok(ImportJob::ephemeral(memory.id, position, channel.id()))
    }

    /// Replace whatever unit carries `tuid`.
    #[allow(clippy::too_many_arguments)]
    pub fn replace_by_tuid(
        &self,
        direction: LanguageDirection,
        memory: &Memory,
        tuid: Uuid,
        sentence: &str,
        translation: &str,
        timestamp: Option<DateTime<Utc>>,
        channel: ChannelId,
    ) -> Result<ImportJob> {
        let channel = self.channel(channel)?.clone();

        let packet = Packet::overwrite_by_tuid(UnitPayload {
            direction,
            owner: memory.owner,
            memory: memory.id,
            tuid: Some(tuid),
            sentence: sentence.to_string(),
            translation: translation.to_string(),
            timestamp,
        });

        let position = self.append(packet, true, &channel)?;
        Ok(ImportJob::ephemeral(memory.id, position, channel.id()))
    }

    /// Schedule deletion of every record belonging to `memory`.
    pub fn delete(&self, memory: i64) -> Result<()> {
        let channel = self.channel(MEMORY_UPLOAD_CHANNEL)?.clone();
        self.append(Packet::deletion(memory), true, &channel)?;
        Ok(())
    }

    /// The aggregate watermark over all registered listeners, normalized to
    /// resume positions. Recomputed on every call.
    pub fn channel_positions(&self) -> HashMap<ChannelId, i64> {
        let channel_ids: Vec<ChannelId> = self.channels.iter().map(LogChannel::id).collect();
        let listeners = self.listeners.lock().clone();
        watermark::aggregate_positions(&listeners, &channel_ids)
    }

    /// Block until the aggregate watermark of `channel` reaches `position`.
    pub fn wait_channel_position(&self, channel: ChannelId, position: i64) -> Result<()> {
        let mut targets = HashMap::with_capacity(1);
        targets.insert(channel, position);
        self.wait_channel_positions(&targets)
    }

    /// Block until the aggregate watermark of every channel in `targets`
    /// reaches its target position. Polls at the configured interval; a
    /// target of 0 is trivially satisfied. Returns
    /// [`BinaryLogError::Interrupted`] when the log shuts down mid-wait.
    pub fn wait_channel_positions(&self, targets: &HashMap<ChannelId, i64>) -> Result<()> {
        loop {
            let current = self.channel_positions();

            let wait = targets.iter().any(|(channel, target)| {
                *target != 0 && current.get(channel).map_or(true, |position| position < target)
            });
            if !wait {
                return Ok(());
            }

            if matches!(
                self.state(),
                ConnectionState::Closing | ConnectionState::Closed
            ) {
                return Err(BinaryLogError::Interrupted);
            }

            thread::sleep(self.config.wait_poll_interval());
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if let Some(reason) = self.fault.lock().clone() {
            return Err(BinaryLogError::PollLoopFailed { reason });
        }
        Ok(())
    }

    fn append(&self, packet: Packet, sync: bool, channel: &LogChannel) -> Result<i64> {
        self.ensure_running()?;

        let producer = self
            .producer
            .lock()
            .clone()
            .ok_or(BinaryLogError::TransportUnavailable)?;

        let pending = producer.append(channel.id(), packet.encode())?;
        if sync {
            Ok(pending.wait()?)
        } else {
            Ok(-1)
        }
    }

    /// Stop the polling worker (grace period, then abandon) and release the
    /// transport handles. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if matches!(*state, ConnectionState::Closing | ConnectionState::Closed) {
                return;
            }
            *state = ConnectionState::Closing;
        }

        if let Some(polling) = self.polling.lock().take() {
            polling.shutdown(self.config.shutdown_grace());
        }
        if let Some(producer) = self.producer.lock().take() {
            producer.close();
        }

        *self.state.lock() = ConnectionState::Closed;
        info!("binary log closed");
    }
}

impl Drop for BinaryLog {
    fn drop(&mut self) {
        self.close();
    }
}

fn addition(memory: &Memory, pair: &StringPair, tuid: Option<Uuid>) -> Packet {
    Packet::addition(UnitPayload {
        direction: pair.direction.clone(),
        owner: memory.owner,
        memory: memory.id,
        tuid,
        sentence: pair.source.clone(),
        translation: pair.target.clone(),
        timestamp: pair.timestamp,
    })
}

/// Consumer side of the connection attempt, run on the helper thread: open
/// the handle, read the tail positions, seek every channel to its resume
/// position.
fn open_and_seek(
    transport: &dyn LogTransport,
    channels: &[ChannelId],
    resume: &HashMap<ChannelId, i64>,
) -> Result<(Box<dyn LogConsumer>, HashMap<ChannelId, i64>)> {
    let consumer = transport.open_consumer(channels)?;

    let mut tails = HashMap::with_capacity(channels.len());
    for &channel in channels {
        tails.insert(channel, consumer.tail_position(channel)?);
    }

    for (&channel, &position) in resume {
        info!(channel, position, "channel seek");
        consumer.seek(channel, position)?;
    }

    Ok((consumer, tails))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StringPairCorpus;
    use crate::testing::{RecordingListener, WhitespaceProcessor, XorAligner};
    use crate::transport::MemoryLog;

    fn en_it() -> LanguageDirection {
        LanguageDirection::parse("en", "it").unwrap()
    }

    fn binary_log() -> BinaryLog {
        let transport = MemoryLog::new(&[0, 1]);
        BinaryLog::new(
            BinaryLogConfig::default(),
            Arc::new(transport),
            LanguageIndex::new(vec![en_it()]),
            Some(Arc::new(WhitespaceProcessor)),
            Some(Arc::new(XorAligner)),
        )
        .unwrap()
    }

    #[test]
    fn test_starts_disconnected() {
        let log = binary_log();
        assert_eq!(log.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_append_before_connect_fails() {
        let log = binary_log();
        let err = log
            .upload(en_it(), &Memory::new(1), "hello", "ciao", None, None, 1)
            .unwrap_err();
        assert!(matches!(err, BinaryLogError::TransportUnavailable));
    }

    #[test]
    fn test_connect_producer_only() {
        let log = binary_log();
        let tails = log
            .connect_with(Duration::from_secs(5), true, false)
            .unwrap();
        assert!(tails.is_none());
        assert_eq!(log.state(), ConnectionState::Connected);

        let job = log
            .upload(en_it(), &Memory::new(1), "hello", "ciao", None, None, 1)
            .unwrap();
        assert_eq!(job.begin(), 0);
        assert_eq!(job.channel(), 1);
        log.close();
        assert_eq!(log.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_double_connect_is_rejected() {
        let log = binary_log();
        log.connect_with(Duration::from_secs(5), true, false).unwrap();
        let err = log
            .connect_with(Duration::from_secs(5), true, false)
            .unwrap_err();
        assert!(matches!(err, BinaryLogError::InvalidState(_)));
    }

    #[test]
    fn test_connect_returns_tail_positions() {
        let log = binary_log();
        log.register_listener(Arc::new(RecordingListener::new("store")))
            .unwrap();

        let tails = log.connect().unwrap().unwrap();
        assert_eq!(tails[&0], 0);
        assert_eq!(tails[&1], 0);
        log.close();
    }

    #[test]
    fn test_register_listener_after_connect_is_rejected() {
        let log = binary_log();
        log.connect_with(Duration::from_secs(5), true, false).unwrap();

        let err = log
            .register_listener(Arc::new(RecordingListener::new("late")))
            .unwrap_err();
        assert!(matches!(err, BinaryLogError::InvalidState(_)));
        log.close();
    }

    #[test]
    fn test_append_after_close_fails() {
        let log = binary_log();
        log.connect_with(Duration::from_secs(5), true, false).unwrap();
        log.close();

        let err = log
            .upload(en_it(), &Memory::new(1), "hello", "ciao", None, None, 1)
            .unwrap_err();
        assert!(matches!(err, BinaryLogError::TransportUnavailable));
    }

    #[test]
    fn test_upload_corpus_positions_and_size() {
        let log = binary_log();
        log.connect_with(Duration::from_secs(5), true, false).unwrap();

        let corpus = StringPairCorpus::new(
            "sample",
            vec![
                StringPair::new(en_it(), "one", "uno"),
                StringPair::new(en_it(), "two", "due"),
                StringPair::new(en_it(), "three", "tre"),
            ],
        );

        let job = log
            .upload_corpus(&Memory::new(4), &corpus, 0)
            .unwrap()
            .unwrap();
        assert_eq!(job.begin(), 0);
        assert_eq!(job.end(), 2);
        assert_eq!(job.size(), 3);
        log.close();
    }

    #[test]
    fn test_upload_empty_corpus_returns_none() {
        let log = binary_log();
        log.connect_with(Duration::from_secs(5), true, false).unwrap();

        let corpus = StringPairCorpus::new("empty", vec![]);
        assert!(log.upload_corpus(&Memory::new(4), &corpus, 0).unwrap().is_none());
        log.close();
    }

    #[test]
    fn test_unknown_channel_is_rejected() {
        let log = binary_log();
        log.connect_with(Duration::from_secs(5), true, false).unwrap();

        let err = log
            .upload(en_it(), &Memory::new(1), "a", "b", None, None, 9)
            .unwrap_err();
        assert!(matches!(err, BinaryLogError::UnknownChannel(9)));
        log.close();
    }

    #[test]
    fn test_wait_for_position_zero_returns_immediately() {
        let log = binary_log();
        log.wait_channel_position(0, 0).unwrap();
    }
}
