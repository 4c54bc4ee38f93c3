//! In-memory backend for tests and simulations.
//!
//! `FakeDeck` plays nothing; it advances a position when told to, at a
//! configurable rate, so drift and end-of-track behavior can be reproduced
//! deterministically. Clones share state: hand one to a [`TrackHandle`]
//! and keep the other to poke at.
//!
//! [`TrackHandle`]: crate::TrackHandle

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::handle::{PlaybackBackend, TrackEvent};

/// Commands the deck received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum DeckCommand {
    Load(String),
    Play,
    Pause,
    Seek(f64),
    Gain(f32),
}

#[derive(Debug)]
struct DeckState {
    duration: f64,
    position: f64,
    rate: f64,
    playing: bool,
    gain: f32,
    events: VecDeque<TrackEvent>,
    commands: Vec<DeckCommand>,
}

#[derive(Debug, Clone)]
pub struct FakeDeck {
    state: Rc<RefCell<DeckState>>,
}

impl FakeDeck {
    pub fn new(duration: f64) -> Self {
        Self {
            state: Rc::new(RefCell::new(DeckState {
                duration,
                position: 0.0,
                rate: 1.0,
                playing: false,
                gain: 1.0,
                events: VecDeque::new(),
                commands: Vec::new(),
            })),
        }
    }

    /// Queue the `Ready` notification a real decoder would eventually send.
    pub fn finish_loading(&self) {
        self.state.borrow_mut().events.push_back(TrackEvent::Ready);
    }

    pub fn fail_loading(&self, reason: &str) {
        self.state
            .borrow_mut()
            .events
            .push_back(TrackEvent::LoadFailed(reason.to_string()));
    }

    /// Simulate the user dragging this track's playhead.
    pub fn user_seek(&self, seconds: f64) {
        let mut state = self.state.borrow_mut();
        state.position = seconds.clamp(0.0, state.duration);
        state.events.push_back(TrackEvent::UserSeeked(seconds));
    }

    /// Overwrite the position without recording a command.
    pub fn force_position(&self, seconds: f64) {
        self.state.borrow_mut().position = seconds;
    }

    /// Playback speed relative to real time, used to make a deck drift.
    pub fn set_rate(&self, rate: f64) {
        self.state.borrow_mut().rate = rate;
    }

    /// Advance a playing deck by `seconds` of wall time. Reaching the end
    /// stops the deck and queues `Finished`.
    pub fn advance(&self, seconds: f64) {
        let mut state = self.state.borrow_mut();
        if !state.playing {
            return;
        }
        state.position += seconds * state.rate;
        if state.position >= state.duration {
            state.position = state.duration;
            state.playing = false;
            state.events.push_back(TrackEvent::Finished);
        }
    }

    pub fn position(&self) -> f64 {
        self.state.borrow().position
    }

    pub fn is_playing(&self) -> bool {
        self.state.borrow().playing
    }

    pub fn gain(&self) -> f32 {
        self.state.borrow().gain
    }

    pub fn commands(&self) -> Vec<DeckCommand> {
        self.state.borrow().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.borrow_mut().commands.clear();
    }
}

impl PlaybackBackend for FakeDeck {
    fn load(&mut self, url: &str) {
        self.state
            .borrow_mut()
            .commands
            .push(DeckCommand::Load(url.to_string()));
    }

    fn play(&mut self) {
        let mut state = self.state.borrow_mut();
        state.commands.push(DeckCommand::Play);
        if state.position < state.duration {
            state.playing = true;
        }
    }

    fn pause(&mut self) {
        let mut state = self.state.borrow_mut();
        state.commands.push(DeckCommand::Pause);
        state.playing = false;
    }

    fn set_position(&mut self, seconds: f64) {
        let mut state = self.state.borrow_mut();
        state.commands.push(DeckCommand::Seek(seconds));
        state.position = seconds;
    }

    fn set_gain(&mut self, gain: f32) {
        let mut state = self.state.borrow_mut();
        state.commands.push(DeckCommand::Gain(gain));
        state.gain = gain;
    }

    fn position(&self) -> f64 {
        self.state.borrow().position
    }

    fn duration(&self) -> f64 {
        self.state.borrow().duration
    }

    fn is_playing(&self) -> bool {
        self.state.borrow().playing
    }

    fn poll_event(&mut self) -> Option<TrackEvent> {
        self.state.borrow_mut().events.pop_front()
    }
}
