//! Text-to-speech: engine interface, on-disk cache and per-line voicing.

pub mod cache;
pub mod voicer;

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};
use crate::process::{run, CancelToken};

pub use cache::{default_cache_dir, SpeechCache};
pub use voicer::{SpeechRequest, Synthesized, Voicer};

/// Speech synthesis backend.
pub trait SpeechEngine: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Voice identifiers this engine accepts. An empty list means the
    /// engine cannot enumerate voices and any identifier is passed through.
    fn voices(&self) -> Result<Vec<String>>;

    /// Render `text` spoken by `voice` into the WAV file `out_wav`.
    fn render(&self, text: &str, voice: &str, out_wav: &Path) -> Result<()>;
}

/// A command-line synthesizer.
///
/// `render_args` may contain `{voice}`, `{out}` and `{text}` placeholders.
/// Without a `{text}` placeholder the text is written to the program's
/// stdin.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    pub program: String,
    pub render_args: Vec<String>,
    /// Arguments that print the voice table, if the program has one.
    pub list_args: Option<Vec<String>>,
    cancel: CancelToken,
}

impl CommandEngine {
    pub fn new(program: &str, render_args: &[&str], list_args: Option<&[&str]>) -> Self {
        Self {
            program: program.to_string(),
            render_args: render_args.iter().map(|s| s.to_string()).collect(),
            list_args: list_args.map(|args| args.iter().map(|s| s.to_string()).collect()),
            cancel: CancelToken::new(),
        }
    }

    /// eSpeak NG reading from stdin.
    pub fn espeak() -> Self {
        Self::new(
            "espeak-ng",
            &["-v", "{voice}", "-w", "{out}", "--stdin"],
            Some(&["--voices"][..]),
        )
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn expand(&self, text: &str, voice: &str, out_wav: &Path) -> (Vec<String>, bool) {
        let out = out_wav.to_string_lossy();
        let mut uses_text = false;
        let args = self
            .render_args
            .iter()
            .map(|arg| {
                uses_text |= arg.contains("{text}");
                arg.replace("{voice}", voice)
                    .replace("{out}", &out)
                    .replace("{text}", text)
            })
            .collect();
        (args, uses_text)
    }
}

impl Default for CommandEngine {
    fn default() -> Self {
        Self::espeak()
    }
}

impl SpeechEngine for CommandEngine {
    fn name(&self) -> &str {
        &self.program
    }

    fn voices(&self) -> Result<Vec<String>> {
        let Some(list_args) = &self.list_args else {
            return Ok(vec![]);
        };
        let output = Command::new(&self.program)
            .args(list_args)
            .output()
            .map_err(|e| Error::Subprocess {
                program: self.program.clone(),
                message: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(Error::Subprocess {
                program: self.program.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(parse_voice_table(&String::from_utf8_lossy(&output.stdout)))
    }

    fn render(&self, text: &str, voice: &str, out_wav: &Path) -> Result<()> {
        let (args, uses_text) = self.expand(text, voice, out_wav);
        let mut cmd = Command::new(&self.program);
        cmd.args(&args);
        run(cmd, if uses_text { None } else { Some(text) }, &self.cancel)
    }
}

/// Parse an eSpeak-style voice table: a header row, then one voice per row
/// with the language code in the second column and the name in the fourth.
pub fn parse_voice_table(table: &str) -> Vec<String> {
    let mut voices: Vec<String> = Vec::new();
    for row in table.lines().skip(1) {
        let cols: Vec<&str> = row.split_whitespace().collect();
        for &id in [cols.get(1), cols.get(3)].into_iter().flatten() {
            if !voices.iter().any(|v| v == id) {
                voices.push(id.to_string());
            }
        }
    }
    voices
}
