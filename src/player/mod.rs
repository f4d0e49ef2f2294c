//! Phrase construction: turning the navigator's current element into a
//! [`Phrase`] with its text and resolved audio.
//!
//! [`PlayerState`] runs the two chained loads (timing document, then audio)
//! and hands finished phrases to a [`PhrasePresenter`].

mod state;

pub use state::PlayerState;

use std::fmt;

pub use crate::smil::{AudioClip, AudioSource};

/// One unit of text and optional audio, ready to present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    pub element_id: String,
    pub text: String,
    pub audio_clip: Option<AudioClip>,
    /// Nothing is voiced for this phrase.
    pub is_silent: bool,
}

impl Phrase {
    pub fn new(element_id: impl Into<String>, text: impl Into<String>, audio_clip: Option<AudioClip>) -> Self {
        Self {
            element_id: element_id.into(),
            text: text.into(),
            audio_clip,
            is_silent: false,
        }
    }

    /// A phrase with no audio.
    pub fn silent(element_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            is_silent: true,
            ..Self::new(element_id, text, None)
        }
    }
}

/// Accumulated state of one phrase construction cycle.
#[derive(Debug, Clone)]
pub struct PhraseConstructionKit {
    /// Generation of the request that started this cycle.
    pub request_id: u64,
    pub element_id: String,
    pub text: String,
    pub timing_ref: String,
    pub timing_doc_path: String,
    /// Fragment of the timing reference, looked up in the timing document.
    pub local_ref_id: String,
    /// Clip found in the timing document, before its audio is loaded.
    pub audio_clip: Option<AudioClip>,
    pub can_resume: bool,
}

impl PhraseConstructionKit {
    fn into_phrase(self, audio_clip: Option<AudioClip>) -> Phrase {
        match audio_clip {
            Some(clip) => Phrase::new(self.element_id, self.text, Some(clip)),
            None => Phrase::silent(self.element_id, self.text),
        }
    }
}

/// Playback mode as reported by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerMode {
    Playing,
    Paused,
    #[default]
    Stopped,
}

impl fmt::Display for PlayerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerMode::Playing => write!(f, "playing"),
            PlayerMode::Paused => write!(f, "paused"),
            PlayerMode::Stopped => write!(f, "stopped"),
        }
    }
}

/// Where the current construction cycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Idle,
    AwaitingTimingDoc,
    AwaitingAudio,
    Delivered,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => write!(f, "idle"),
            Stage::AwaitingTimingDoc => write!(f, "awaiting timing document"),
            Stage::AwaitingAudio => write!(f, "awaiting audio"),
            Stage::Delivered => write!(f, "delivered"),
        }
    }
}

/// Receives finished phrases.
///
/// Called exactly once per construction cycle that completes; never for a
/// cycle superseded by a newer request or ended by a load failure.
pub trait PhrasePresenter {
    /// `can_resume` is set when playback was paused on this same timing
    /// reference, so the clip should continue rather than restart.
    fn present_phrase(&mut self, phrase: Phrase, can_resume: bool);
}

impl<F> PhrasePresenter for F
where
    F: FnMut(Phrase, bool),
{
    fn present_phrase(&mut self, phrase: Phrase, can_resume: bool) {
        self(phrase, can_resume)
    }
}
