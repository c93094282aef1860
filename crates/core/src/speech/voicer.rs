//! Turning subtitle lines into speech clips.
//!
//! Voice selection is planned sequentially, since a line may switch the
//! voice for every line after it. Rendering is then independent per line
//! and runs on a thread pool.

use rayon::prelude::*;

use crate::audio::AudioClip;
use crate::error::{Error, Result};
use crate::speech::cache::SpeechCache;
use crate::speech::SpeechEngine;
use crate::subtitles::Line;

/// Default prefix that marks a voice switch at the start of a line.
pub const DEFAULT_VOICE_ANCHOR: &str = "!:";

/// One line to render.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub line: usize,
    pub text: String,
    pub voice: String,
    /// Length of the subtitle slot, used for the silent fallback.
    pub nominal_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Synthesized {
    pub clip: AudioClip,
    /// Synthesis failed and `clip` is silence of the nominal length.
    pub fell_back: bool,
}

pub struct Voicer<E: SpeechEngine> {
    engine: E,
    cache: SpeechCache,
    voice: String,
    anchor: Option<String>,
    sample_rate: u32,
}

impl<E: SpeechEngine> Voicer<E> {
    pub fn new(engine: E, cache: SpeechCache, voice: &str, sample_rate: u32) -> Self {
        Self {
            engine,
            cache,
            voice: voice.to_string(),
            anchor: Some(DEFAULT_VOICE_ANCHOR.to_string()),
            sample_rate,
        }
    }

    /// Change the voice-switch prefix. `None` disables in-text switching.
    pub fn with_anchor(mut self, anchor: Option<&str>) -> Self {
        self.anchor = anchor.filter(|a| !a.is_empty()).map(str::to_string);
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn cache(&self) -> &SpeechCache {
        &self.cache
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Set the default voice, checked case-insensitively against the
    /// engine's voice list.
    pub fn select_voice(&mut self, voice: &str) -> Result<()> {
        self.voice = self.resolve_voice(voice)?;
        log::info!("Using voice \"{}\"", self.voice);
        Ok(())
    }

    fn resolve_voice(&self, voice: &str) -> Result<String> {
        let available = self.engine.voices()?;
        if available.is_empty() {
            return Ok(voice.to_string());
        }
        available
            .iter()
            .find(|v| v.eq_ignore_ascii_case(voice))
            .cloned()
            .ok_or_else(|| Error::UnknownVoice {
                voice: voice.to_string(),
                available: available.join(", "),
            })
    }

    /// Work out the text and voice of each line.
    ///
    /// A first text line starting with the anchor names a voice that is
    /// used from that line on; the rest of the line's text is spoken. The
    /// default voice itself is not changed.
    pub fn plan(&self, lines: &[Line]) -> Result<Vec<SpeechRequest>> {
        let mut voice = self.voice.clone();
        let mut requests = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            let mut text = line.text.as_str();
            if let Some(anchor) = &self.anchor {
                if let Some(rest) = text.strip_prefix(anchor.as_str()) {
                    let (name, remainder) = rest.split_once('\n').unwrap_or((rest, ""));
                    voice = self.resolve_voice(name.trim())?;
                    log::debug!("Line {}: switching to voice \"{}\"", index + 1, voice);
                    text = remainder;
                }
            }
            requests.push(SpeechRequest {
                line: index,
                text: text.trim().to_string(),
                voice: voice.clone(),
                nominal_ms: line.ms.duration_ms(),
            });
        }

        Ok(requests)
    }

    /// Speech for `text`, from the cache or freshly rendered, at the
    /// voicer's sample rate. Empty text gives an empty clip.
    pub fn synthesize(&self, text: &str, voice: &str) -> Result<AudioClip> {
        if text.is_empty() {
            return Ok(AudioClip::empty(self.sample_rate));
        }
        let path = match self.cache.lookup(text, voice) {
            Some(path) => path,
            None => self
                .cache
                .store_with(text, voice, |tmp| self.engine.render(text, voice, tmp))?,
        };
        AudioClip::load(&path)?.resampled(self.sample_rate)
    }

    fn synthesize_request(&self, request: &SpeechRequest) -> Synthesized {
        match self.synthesize(&request.text, &request.voice) {
            Ok(clip) => Synthesized { clip, fell_back: false },
            Err(e) => {
                let err = Error::Synthesis {
                    line: request.line + 1,
                    message: e.to_string(),
                };
                log::warn!("{}; using {} ms of silence", err, request.nominal_ms);
                Synthesized {
                    clip: AudioClip::silent(request.nominal_ms as f64, self.sample_rate),
                    fell_back: true,
                }
            }
        }
    }

    /// Render every request, `threads` at a time. Results keep the order of
    /// `requests`. A line that fails becomes silence of its nominal length.
    pub fn synthesize_all(&self, requests: &[SpeechRequest], threads: usize) -> Vec<Synthesized> {
        if threads < 2 || requests.len() < 2 {
            return requests.iter().map(|r| self.synthesize_request(r)).collect();
        }

        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(|| {
                requests
                    .par_iter()
                    .map(|r| self.synthesize_request(r))
                    .collect()
            }),
            Err(e) => {
                log::warn!("Could not start {} synthesis threads ({}), running sequentially", threads, e);
                requests.iter().map(|r| self.synthesize_request(r)).collect()
            }
        }
    }
}
