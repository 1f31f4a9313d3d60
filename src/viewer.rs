//! Viewer state files
//!
//! The external viewer polls a few small JavaScript files in its directory:
//! `mode.js` (image or text), `scroll.js` (scroll offset) and `content.js`
//! (the current text page as HTML).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::DisplayMode;
use crate::constants::viewer::{CONTENT_FILE, MODE_FILE, PAGE_CHARS, SCROLL_FILE};

pub trait ViewerSync: Send + Sync {
    fn write_mode(&self, mode: DisplayMode) -> Result<()>;
    fn write_scroll_offset(&self, offset: i32) -> Result<()>;
    fn write_content(&self, text: &str) -> Result<()>;
}

pub struct FileViewer {
    dir: PathBuf,
}

impl FileViewer {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create viewer directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn write_var(&self, file: &str, name: &str, value: &str) -> Result<()> {
        let target = self.dir.join(file);
        let staging = self.dir.join(format!(".{file}.tmp"));
        fs::write(&staging, format!("var {name} = {value};\n"))
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        fs::rename(&staging, &target)
            .with_context(|| format!("Failed to replace {}", target.display()))?;
        debug!(file = %target.display(), "Viewer file updated");
        Ok(())
    }
}

impl ViewerSync for FileViewer {
    fn write_mode(&self, mode: DisplayMode) -> Result<()> {
        let value = serde_json::to_string(mode.as_str()).context("Failed to encode mode")?;
        self.write_var(MODE_FILE, "mode", &value)?;
        info!(mode = mode.as_str(), "Viewer mode synced");
        Ok(())
    }

    fn write_scroll_offset(&self, offset: i32) -> Result<()> {
        self.write_var(SCROLL_FILE, "scroll", &offset.to_string())
    }

    fn write_content(&self, text: &str) -> Result<()> {
        let value = serde_json::to_string(&to_paragraphs(text)).context("Failed to encode content")?;
        self.write_var(CONTENT_FILE, "content", &value)
    }
}

/// Render plain text as `<p>` paragraphs, joining words hyphenated across lines
pub fn to_paragraphs(text: &str) -> String {
    let mut joined = String::with_capacity(text.len());
    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        let line = line.trim_end();
        match line.strip_suffix('-') {
            Some(head) if lines.peek().is_some() => joined.push_str(head),
            _ => {
                joined.push_str(line);
                if lines.peek().is_some() {
                    joined.push('\n');
                }
            }
        }
    }

    joined
        .split('\n')
        .map(|para| format!("<p>{}</p>", escape_html(para)))
        .collect()
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Text file shown in fixed-size pages
#[derive(Debug, Clone)]
pub struct TextSource {
    chars: Vec<char>,
    page: usize,
}

impl TextSource {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            page: 0,
        }
    }

    /// A missing file yields an empty source
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                info!(path = %path.display(), chars = text.chars().count(), "Loaded text source");
                Ok(Self::new(&text))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No text source file");
                Ok(Self::new(""))
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        self.chars.len().div_ceil(PAGE_CHARS).max(1)
    }

    pub fn current(&self) -> String {
        let start = (self.page * PAGE_CHARS).min(self.chars.len());
        let end = (start + PAGE_CHARS).min(self.chars.len());
        self.chars[start..end].iter().collect()
    }

    /// Move by `delta` pages, clamped. Returns true if the page changed.
    pub fn turn(&mut self, delta: i32) -> bool {
        let last = self.page_count() as i64 - 1;
        let next = (self.page as i64 + delta as i64).clamp(0, last) as usize;
        let changed = next != self.page;
        self.page = next;
        changed
    }
}
