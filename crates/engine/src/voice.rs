use basedrop::Shared;
use cpal::{FromSample, SizedSample};
use stems_decode::StemAudio;

/// Control messages from the player to the audio callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Play,
    Pause,
    /// Jump to `frame`. `generation` tags every status sent afterwards so
    /// the player can discard reports from before the seek.
    Seek { frame: usize, generation: u64 },
    Gain(f32),
}

/// Reports from the audio callback back to the player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Status {
    Position { frame: usize, generation: u64 },
    Finished { generation: u64 },
}

/// Playback state owned by the audio callback.
///
/// The audio has already been converted to the output's rate and channel
/// layout, so rendering is a straight copy with gain.
pub struct Voice {
    audio: Shared<StemAudio>,
    frame: usize,
    playing: bool,
    /// Ran off the end since the last seek.
    ended: bool,
    gain: f32,
    generation: u64,
}

impl Voice {
    pub fn new(audio: Shared<StemAudio>, gain: f32) -> Self {
        Self {
            audio,
            frame: 0,
            playing: false,
            ended: false,
            gain,
            generation: 0,
        }
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Play => self.playing = self.frame < self.audio.frames(),
            Command::Pause => self.playing = false,
            Command::Seek { frame, generation } => {
                self.frame = frame.min(self.audio.frames());
                self.ended = false;
                self.generation = generation;
            }
            Command::Gain(gain) => self.gain = gain,
        }
    }

    /// Fill `out` and report where playback is. Running off the end stops
    /// the voice; from then on every call also returns `Finished` until the
    /// next seek, so a report lost to a full status queue is repeated.
    pub fn render<T>(&mut self, out: &mut [T], channels: usize) -> (Status, Option<Status>)
    where
        T: SizedSample + FromSample<f32>,
    {
        let samples = self.audio.samples();
        let frames = self.audio.frames();
        let stride = self.audio.channels() as usize;

        for out_frame in out.chunks_mut(channels) {
            if self.playing && self.frame < frames {
                let start = self.frame * stride;
                for (sample, value) in out_frame.iter_mut().zip(&samples[start..start + stride]) {
                    *sample = T::from_sample(value * self.gain);
                }
                self.frame += 1;
            } else {
                for sample in out_frame.iter_mut() {
                    *sample = T::from_sample(0.0);
                }
            }
        }

        if self.playing && self.frame >= frames {
            self.playing = false;
            self.ended = true;
        }
        let finished = self.ended.then_some(Status::Finished {
            generation: self.generation,
        });

        let position = Status::Position {
            frame: self.frame,
            generation: self.generation,
        };
        (position, finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Collector;

    fn voice(samples: Vec<f32>, channels: u16) -> (Voice, Collector) {
        let collector = Collector::new();
        let audio = StemAudio::new(samples, 48000, channels).unwrap();
        let voice = Voice::new(Shared::new(&collector.handle(), audio), 1.0);
        (voice, collector)
    }

    #[test]
    fn test_paused_voice_renders_silence() {
        let (mut voice, _collector) = voice(vec![0.5; 8], 2);
        let mut out = [1.0f32; 4];
        let (position, finished) = voice.render(&mut out, 2);

        assert_eq!(out, [0.0; 4]);
        assert_eq!(position, Status::Position { frame: 0, generation: 0 });
        assert_eq!(finished, None);
    }

    #[test]
    fn test_playing_voice_applies_gain() {
        let (mut voice, _collector) = voice(vec![0.5, -0.5, 0.25, -0.25], 2);
        voice.apply(Command::Gain(0.5));
        voice.apply(Command::Play);

        let mut out = [0.0f32; 2];
        voice.render(&mut out, 2);
        assert_eq!(out, [0.25, -0.25]);
    }

    #[test]
    fn test_end_of_material_reports_finished_until_seek() {
        let (mut voice, _collector) = voice(vec![0.1, 0.2, 0.3], 1);
        voice.apply(Command::Play);

        let mut out = [0.0f32; 5];
        let (position, finished) = voice.render(&mut out, 1);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.0, 0.0]);
        assert_eq!(position, Status::Position { frame: 3, generation: 0 });
        assert_eq!(finished, Some(Status::Finished { generation: 0 }));

        let (_, finished) = voice.render(&mut out, 1);
        assert_eq!(finished, Some(Status::Finished { generation: 0 }));

        // Play at the end does nothing until a seek moves the playhead back.
        voice.apply(Command::Play);
        voice.render(&mut out, 1);
        assert_eq!(out, [0.0; 5]);

        voice.apply(Command::Seek { frame: 0, generation: 1 });
        let (position, finished) = voice.render(&mut out, 1);
        assert_eq!(position, Status::Position { frame: 0, generation: 1 });
        assert_eq!(finished, None);
    }

    #[test]
    fn test_seek_tags_later_statuses() {
        let (mut voice, _collector) = voice(vec![0.0; 100], 1);
        voice.apply(Command::Seek { frame: 40, generation: 3 });
        voice.apply(Command::Play);

        let mut out = [0.0f32; 10];
        let (position, _) = voice.render(&mut out, 1);
        assert_eq!(position, Status::Position { frame: 50, generation: 3 });

        voice.apply(Command::Seek { frame: 1000, generation: 4 });
        let (position, _) = voice.render(&mut out, 1);
        assert_eq!(position, Status::Position { frame: 100, generation: 4 });
    }
}
