use std::collections::VecDeque;
use std::path::PathBuf;

use basedrop::{Collector, Shared};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam::channel::{Receiver, TryRecvError, bounded};
use stems_decode::{StemAudio, decode_stem};
use stems_transport::{PlaybackBackend, TrackEvent};

use crate::voice::{Command, Status, Voice};

const COMMAND_CAPACITY: usize = 64;
const STATUS_CAPACITY: usize = 256;

/// One stem on its own output stream.
///
/// Loading decodes on the rayon pool and converts the stem to the default
/// output device's rate and channel layout; the stream is opened once that
/// finishes. Every stem runs on its own stream, so stems can drift apart.
pub struct StemPlayer {
    name: String,
    root: Option<PathBuf>,
    collector: Collector,
    load: LoadState,
    events: VecDeque<TrackEvent>,
    position: f64,
    duration: f64,
    playing: bool,
    gain: f32,
    generation: u64,
}

enum LoadState {
    Idle,
    Decoding {
        result: Receiver<anyhow::Result<StemAudio>>,
        device: cpal::Device,
        config: cpal::SupportedStreamConfig,
    },
    Ready(Output),
    Failed,
}

struct Output {
    commands: rtrb::Producer<Command>,
    status: rtrb::Consumer<Status>,
    /// Control-side view of the samples the callback plays.
    audio: StemAudio,
    _stream: cpal::Stream,
}

impl StemPlayer {
    /// `root` is where relative stem paths are looked up.
    pub fn new(name: impl Into<String>, root: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root,
            collector: Collector::new(),
            load: LoadState::Idle,
            events: VecDeque::new(),
            position: 0.0,
            duration: 0.0,
            playing: false,
            gain: 1.0,
            generation: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn fail(&mut self, reason: String) {
        tracing::error!(stem = %self.name, %reason, "Stem unavailable");
        self.load = LoadState::Failed;
        self.events.push_back(TrackEvent::LoadFailed(reason));
    }

    fn send(&mut self, command: Command) {
        let LoadState::Ready(output) = &mut self.load else {
            return;
        };
        if output.commands.push(command).is_err() {
            tracing::warn!(stem = %self.name, ?command, "Command queue full, dropping command");
        }
    }

    fn poll_decode(&mut self) {
        let LoadState::Decoding { result, .. } = &self.load else {
            return;
        };
        let decoded = match result.try_recv() {
            Ok(decoded) => decoded,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => Err(anyhow::anyhow!("decoder exited without a result")),
        };
        let LoadState::Decoding { device, config, .. } =
            std::mem::replace(&mut self.load, LoadState::Idle)
        else {
            return;
        };

        let audio = match decoded {
            Ok(audio) => audio,
            Err(e) => return self.fail(format!("{e:#}")),
        };
        match self.open_output(&device, &config, audio) {
            Ok(output) => {
                tracing::info!(
                    stem = %self.name,
                    duration = self.duration,
                    sample_rate = output.audio.sample_rate(),
                    "Stem ready"
                );
                self.load = LoadState::Ready(output);
                self.events.push_back(TrackEvent::Ready);
            }
            Err(e) => self.fail(format!("cannot open output: {e:#}")),
        }
    }

    fn open_output(
        &mut self,
        device: &cpal::Device,
        config: &cpal::SupportedStreamConfig,
        audio: StemAudio,
    ) -> anyhow::Result<Output> {
        let (command_tx, command_rx) = rtrb::RingBuffer::<Command>::new(COMMAND_CAPACITY);
        let (status_tx, status_rx) = rtrb::RingBuffer::<Status>::new(STATUS_CAPACITY);

        self.duration = audio.duration_secs();
        let voice = Voice::new(Shared::new(&self.collector.handle(), audio.clone()), self.gain);

        let stream_config: cpal::StreamConfig = config.clone().into();
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(device, &stream_config, &self.name, voice, command_rx, status_tx)?
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(device, &stream_config, &self.name, voice, command_rx, status_tx)?
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(device, &stream_config, &self.name, voice, command_rx, status_tx)?
            }
            sample_format => anyhow::bail!("unsupported sample format '{sample_format}'"),
        };
        stream.play()?;

        Ok(Output {
            commands: command_tx,
            status: status_rx,
            audio,
            _stream: stream,
        })
    }

    fn drain_status(&mut self) {
        let LoadState::Ready(output) = &mut self.load else {
            return;
        };
        while let Ok(status) = output.status.pop() {
            match status {
                Status::Position { frame, generation } if generation == self.generation => {
                    self.position = output.audio.secs_at(frame);
                }
                Status::Finished { generation } if generation == self.generation => {
                    if self.playing {
                        self.playing = false;
                        self.position = self.duration;
                        self.events.push_back(TrackEvent::Finished);
                    }
                }
                // Reported before the latest seek.
                _ => {}
            }
        }
    }
}

impl PlaybackBackend for StemPlayer {
    fn load(&mut self, url: &str) {
        if !matches!(self.load, LoadState::Idle) {
            tracing::warn!(stem = %self.name, url, "Stem already loading, ignoring load");
            return;
        }

        let host = cpal::default_host();
        let Some(device) = host.default_output_device() else {
            return self.fail("no output device found".to_string());
        };
        let config = match device.default_output_config() {
            Ok(config) => config,
            Err(e) => return self.fail(format!("no output config: {e}")),
        };

        let (tx, rx) = bounded(1);
        let url = url.to_string();
        let root = self.root.clone();
        let name = self.name.clone();
        let rate = config.sample_rate().0;
        let channels = config.channels();
        rayon::spawn(move || {
            let result = decode_stem(&url, root.as_deref())
                .and_then(|audio| audio.resample(rate))
                .and_then(|audio| audio.with_channels(channels));
            if let Err(e) = &result {
                tracing::debug!(stem = %name, url = %url, error = %e, "Decode failed");
            }
            let _ = tx.send(result);
        });

        tracing::debug!(stem = %self.name, rate, channels, "Decoding stem");
        self.load = LoadState::Decoding {
            result: rx,
            device,
            config,
        };
    }

    fn play(&mut self) {
        if !matches!(self.load, LoadState::Ready(_)) || self.position >= self.duration {
            return;
        }
        self.send(Command::Play);
        self.playing = true;
    }

    fn pause(&mut self) {
        self.send(Command::Pause);
        self.playing = false;
    }

    fn set_position(&mut self, seconds: f64) {
        let LoadState::Ready(output) = &self.load else {
            return;
        };
        let frame = output.audio.frame_at(seconds);
        self.generation += 1;
        self.position = output.audio.secs_at(frame);
        let generation = self.generation;
        self.send(Command::Seek { frame, generation });
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
        self.send(Command::Gain(gain));
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn poll_event(&mut self) -> Option<TrackEvent> {
        self.collector.collect();
        self.poll_decode();
        self.drain_status();
        self.events.pop_front()
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    name: &str,
    mut voice: Voice,
    mut command_rx: rtrb::Consumer<Command>,
    mut status_tx: rtrb::Producer<Status>,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let name = name.to_string();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            while let Ok(command) = command_rx.pop() {
                voice.apply(command);
            }
            let (position, finished) = voice.render(data, channels);
            if let Some(finished) = finished {
                let _ = status_tx.push(finished);
            }
            let _ = status_tx.push(position);
        },
        move |err| tracing::error!(stem = %name, "Stream error: {err}"),
        None,
    )?;

    Ok(stream)
}
