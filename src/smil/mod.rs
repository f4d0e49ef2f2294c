//! Timing documents (SMIL) and audio clip descriptors.
//!
//! A timing document maps the ids of its `par`/`seq` containers, and of the
//! `text`/`audio` elements inside them, to the audio clip that voices them.
//! Elements of the content document point into a timing document through a
//! timing reference of the form `path/to/file.smil#local-id`.

mod clock;

pub use clock::parse_clock_value;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::Result;
use crate::util::{local_name, parent_dir, resolve_href};

/// Where a clip's audio comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Path of the audio resource, relative to the book root.
    Uri(String),
    /// Loaded audio bytes, together with the path they were read from.
    Stream { path: String, data: Arc<[u8]> },
}

impl AudioSource {
    /// Path of the underlying resource.
    pub fn path(&self) -> &str {
        match self {
            AudioSource::Uri(path) => path,
            AudioSource::Stream { path, .. } => path,
        }
    }

    /// Loaded bytes, if this source has been resolved to a stream.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            AudioSource::Uri(_) => None,
            AudioSource::Stream { data, .. } => Some(data),
        }
    }
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSource::Uri(path) => f.debug_tuple("Uri").field(path).finish(),
            AudioSource::Stream { path, data } => f
                .debug_struct("Stream")
                .field("path", path)
                .field("len", &data.len())
                .finish(),
        }
    }
}

/// A span of an audio resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub source: AudioSource,
    pub clip_start: Duration,
    pub clip_end: Duration,
}

impl AudioClip {
    pub fn new(source: AudioSource, clip_start: Duration, clip_end: Duration) -> Self {
        Self {
            source,
            clip_start,
            clip_end,
        }
    }

    /// Length of the clip; zero if the end precedes the start.
    pub fn duration(&self) -> Duration {
        self.clip_end.saturating_sub(self.clip_start)
    }

    /// Build a clip from `src`/`clipBegin`/`clipEnd` attributes.
    ///
    /// `src` is resolved against `base_dir`. Both DAISY 3 (`clipBegin`) and
    /// DAISY 2.02 (`clip-begin`) attribute spellings are accepted.
    pub(crate) fn from_attributes(e: &BytesStart<'_>, base_dir: &str) -> Result<Option<AudioClip>> {
        let mut src = None;
        let mut begin = None;
        let mut end = None;
        for attr in e.attributes().flatten() {
            let value = String::from_utf8_lossy(attr.value.as_ref()).into_owned();
            match local_name(attr.key.as_ref()) {
                b"src" => src = Some(value),
                b"clipBegin" | b"clip-begin" => begin = Some(value),
                b"clipEnd" | b"clip-end" => end = Some(value),
                _ => {}
            }
        }

        let Some(src) = src else {
            return Ok(None);
        };
        let clip_start = begin.as_deref().map(parse_clock_value).transpose()?.unwrap_or_default();
        let clip_end = match end.as_deref() {
            Some(v) => parse_clock_value(v)?,
            None => clip_start,
        };
        let path = resolve_href(base_dir, &percent_decode_str(&src).decode_utf8_lossy());
        Ok(Some(AudioClip::new(AudioSource::Uri(path), clip_start, clip_end)))
    }
}

/// Split a timing reference into `(timing document path, local id)`.
///
/// The path is percent-decoded. A reference without `#` has an empty local id.
pub fn split_timing_ref(timing_ref: &str) -> (String, String) {
    let (path, fragment) = timing_ref.split_once('#').unwrap_or((timing_ref, ""));
    (
        percent_decode_str(path).decode_utf8_lossy().into_owned(),
        fragment.to_string(),
    )
}

/// A parsed timing document.
#[derive(Debug, Clone, Default)]
pub struct TimingDocument {
    path: String,
    clips: HashMap<String, AudioClip>,
}

/// A `par` or `seq` still open while parsing.
struct Container {
    ids: Vec<String>,
    clip: Option<AudioClip>,
}

impl TimingDocument {
    /// Parse the timing document found at `path` (relative to the book root).
    pub fn parse(path: &str, content: &str) -> Result<Self> {
        let base_dir = parent_dir(path);
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut clips = HashMap::new();
        let mut open: Vec<Container> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = e.name();
                    match local_name(name.as_ref()) {
                        b"par" | b"seq" => open.push(Container {
                            ids: element_id(&e).into_iter().collect(),
                            clip: None,
                        }),
                        b"audio" => attach_audio(&mut open, &e, base_dir)?,
                        b"text" => attach_id(&mut open, &e),
                        _ => {}
                    }
                }
                Event::Empty(e) => {
                    let name = e.name();
                    match local_name(name.as_ref()) {
                        b"audio" => attach_audio(&mut open, &e, base_dir)?,
                        b"text" => attach_id(&mut open, &e),
                        _ => {}
                    }
                }
                Event::End(e) => {
                    let name = e.name();
                    if matches!(local_name(name.as_ref()), b"par" | b"seq")
                        && let Some(container) = open.pop()
                    {
                        if let Some(clip) = &container.clip {
                            for id in &container.ids {
                                clips.entry(id.clone()).or_insert_with(|| clip.clone());
                            }
                        }
                        if let Some(parent) = open.last_mut()
                            && parent.clip.is_none()
                        {
                            parent.clip = container.clip;
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Self {
            path: path.to_string(),
            clips,
        })
    }

    /// Path this document was loaded from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Audio clip voicing the container or element with this local id.
    pub fn clip_for(&self, local_id: &str) -> Option<&AudioClip> {
        self.clips.get(local_id)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

fn element_id(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"id")
        .map(|a| String::from_utf8_lossy(a.value.as_ref()).into_owned())
}

fn attach_id(open: &mut [Container], e: &BytesStart<'_>) {
    if let Some(container) = open.last_mut()
        && let Some(id) = element_id(e)
    {
        container.ids.push(id);
    }
}

fn attach_audio(open: &mut [Container], e: &BytesStart<'_>, base_dir: &str) -> Result<()> {
    let clip = AudioClip::from_attributes(e, base_dir)?;
    attach_id(open, e);
    if let Some(container) = open.last_mut() {
        merge_clip(container, clip);
    }
    Ok(())
}

/// Fold a directly contained clip into a container: the first clip wins,
/// and a following clip of the same source extends it.
fn merge_clip(container: &mut Container, clip: Option<AudioClip>) {
    let Some(clip) = clip else {
        return;
    };
    match &mut container.clip {
        None => container.clip = Some(clip),
        Some(existing) if existing.source == clip.source && clip.clip_end > existing.clip_end => {
            existing.clip_end = clip.clip_end;
        }
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMIL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<smil xmlns="http://www.w3.org/2001/SMIL20/">
  <body>
    <seq id="root">
      <par id="tcp1" class="h1">
        <text id="txt1" src="nz.xml#ghGen3"/>
        <audio src="audio/speechgen0001.mp3" clipBegin="0:00:00.000" clipEnd="0:00:01.800"/>
      </par>
      <par id="tcp2">
        <text src="nz.xml#ghGen4"/>
        <seq>
          <audio src="audio/speechgen0001.mp3" clipBegin="0:00:01.800" clipEnd="0:00:03.000"/>
          <audio src="audio/speechgen0001.mp3" clipBegin="0:00:03.000" clipEnd="0:00:04.250"/>
        </seq>
      </par>
    </seq>
  </body>
</smil>"#;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_par_lookup_resolves_relative_audio() {
        let doc = TimingDocument::parse("smil/part1.smil", SMIL).unwrap();
        let clip = doc.clip_for("tcp1").unwrap();
        assert_eq!(clip.source, AudioSource::Uri("smil/audio/speechgen0001.mp3".to_string()));
        assert_eq!(clip.clip_start, ms(0));
        assert_eq!(clip.clip_end, ms(1800));
        assert_eq!(doc.clip_for("txt1"), Some(clip));
        assert_eq!(doc.path(), "smil/part1.smil");
    }

    #[test]
    fn test_consecutive_clips_merge() {
        let doc = TimingDocument::parse("part1.smil", SMIL).unwrap();
        let clip = doc.clip_for("tcp2").unwrap();
        assert_eq!(clip.clip_start, ms(1800));
        assert_eq!(clip.clip_end, ms(4250));
        assert_eq!(clip.duration(), ms(2450));
    }

    #[test]
    fn test_seq_takes_first_clip() {
        let doc = TimingDocument::parse("part1.smil", SMIL).unwrap();
        assert_eq!(doc.clip_for("root"), doc.clip_for("tcp1"));
        assert!(doc.clip_for("missing").is_none());
    }

    #[test]
    fn test_daisy202_attributes() {
        let doc = TimingDocument::parse(
            "ncc.smil",
            r#"<smil><body><par id="p1"><text src="a.html#x"/><audio src="a.mp3" clip-begin="npt=1.5s" clip-end="npt=2s" id="a1"/></par></body></smil>"#,
        )
        .unwrap();
        let clip = doc.clip_for("a1").unwrap();
        assert_eq!(clip.clip_start, ms(1500));
        assert_eq!(clip.clip_end, ms(2000));
        assert_eq!(clip.source.path(), "a.mp3");
    }

    #[test]
    fn test_invalid_clock_is_an_error() {
        let result = TimingDocument::parse(
            "x.smil",
            r#"<smil><par id="p"><audio src="a.mp3" clipBegin="soon"/></par></smil>"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_split_timing_ref() {
        assert_eq!(
            split_timing_ref("speech%20gen.smil#tcp1"),
            ("speech gen.smil".to_string(), "tcp1".to_string())
        );
        assert_eq!(split_timing_ref("only.smil"), ("only.smil".to_string(), String::new()));
    }
}
