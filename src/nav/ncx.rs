//! NCX navigation document parsing (navMap and pageList).

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::{Heading, PageList, PageReference, PageType, TableOfContents};
use crate::error::Result;
use crate::smil::AudioClip;
use crate::util::{collapse_whitespace, local_name, resolve_entity};

/// An open `navPoint` or `pageTarget`.
#[derive(Default)]
struct TargetState {
    id: String,
    play_order: Option<u32>,
    page_type: Option<String>,
    value: Option<String>,
    text: String,
    src: Option<String>,
    audio: Option<AudioClip>,
    children: Vec<Heading>,
}

impl TargetState {
    fn from_start(e: &BytesStart<'_>) -> Self {
        let mut state = TargetState::default();
        for attr in e.attributes().flatten() {
            let value = String::from_utf8_lossy(attr.value.as_ref()).into_owned();
            match attr.key.as_ref() {
                b"id" => state.id = value,
                b"playOrder" => state.play_order = value.trim().parse().ok(),
                b"type" => state.page_type = Some(value),
                b"value" => state.value = Some(value),
                _ => {}
            }
        }
        state
    }
}

/// Parse an NCX document into its table of contents and page list.
///
/// Label audio (`navLabel/audio`) becomes the entry's audio clip, with its
/// source kept as written. Entries without a `content` target are dropped;
/// the children of a dropped heading move up to its parent.
pub fn parse_ncx(content: &str) -> Result<(TableOfContents, PageList)> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);

    let mut roots: Vec<Heading> = Vec::new();
    let mut points: Vec<TargetState> = Vec::new();
    let mut page_target: Option<TargetState> = None;
    let mut pages: Vec<PageReference> = Vec::new();
    let mut in_label = false;
    let mut in_text = false;
    // Label text already captured for the innermost target; later <text>
    // siblings (other languages) are ignored.
    let mut label_done = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"navPoint" => {
                        points.push(TargetState::from_start(&e));
                        label_done = false;
                    }
                    b"pageTarget" => {
                        page_target = Some(TargetState::from_start(&e));
                        label_done = false;
                    }
                    b"navLabel" => in_label = true,
                    b"text" if in_label => in_text = true,
                    b"audio" => attach_audio(&e, in_label, &mut page_target, &mut points)?,
                    b"content" => attach_content(&e, &mut page_target, &mut points),
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"audio" => attach_audio(&e, in_label, &mut page_target, &mut points)?,
                    b"content" => attach_content(&e, &mut page_target, &mut points),
                    _ => {}
                }
            }
            Event::Text(e) => {
                if in_text && !label_done {
                    let raw = String::from_utf8_lossy(e.as_ref());
                    if let Some(state) = current_target(&mut page_target, &mut points) {
                        state.text.push_str(&raw);
                    }
                }
            }
            Event::GeneralRef(e) => {
                if in_text && !label_done {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity)
                        && let Some(state) = current_target(&mut page_target, &mut points)
                    {
                        state.text.push_str(&resolved);
                    }
                }
            }
            Event::End(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"text" if in_text => {
                        in_text = false;
                        label_done = true;
                    }
                    b"navLabel" => in_label = false,
                    b"navPoint" => {
                        if let Some(state) = points.pop() {
                            let siblings = match points.last_mut() {
                                Some(parent) => &mut parent.children,
                                None => &mut roots,
                            };
                            finish_heading(state, siblings);
                        }
                        label_done = true;
                    }
                    b"pageTarget" => {
                        if let Some(state) = page_target.take() {
                            let encountered = pages.len() as u32;
                            if let Some(page) = finish_page(state, encountered) {
                                pages.push(page);
                            }
                        }
                        label_done = true;
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok((TableOfContents::new(roots), PageList::new(pages)))
}

fn current_target<'a>(
    page_target: &'a mut Option<TargetState>,
    points: &'a mut [TargetState],
) -> Option<&'a mut TargetState> {
    match page_target {
        Some(state) => Some(state),
        None => points.last_mut(),
    }
}

fn attach_audio(
    e: &BytesStart<'_>,
    in_label: bool,
    page_target: &mut Option<TargetState>,
    points: &mut [TargetState],
) -> Result<()> {
    if !in_label {
        return Ok(());
    }
    let clip = AudioClip::from_attributes(e, "")?;
    if let Some(state) = current_target(page_target, points)
        && state.audio.is_none()
    {
        state.audio = clip;
    }
    Ok(())
}

fn attach_content(e: &BytesStart<'_>, page_target: &mut Option<TargetState>, points: &mut [TargetState]) {
    let src = e
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"src")
        .map(|a| String::from_utf8_lossy(a.value.as_ref()).into_owned());
    if let Some(state) = current_target(page_target, points) {
        state.src = src;
    }
}

fn finish_heading(state: TargetState, siblings: &mut Vec<Heading>) {
    match state.src {
        Some(src) => siblings.push(Heading {
            id: state.id,
            timing_ref: src,
            level: 0,
            text: collapse_whitespace(&state.text),
            audio_clip: state.audio,
            sub_headings: state.children,
        }),
        None => siblings.extend(state.children),
    }
}

fn finish_page(state: TargetState, encountered: u32) -> Option<PageReference> {
    let timing_ref = state.src?;
    let text = collapse_whitespace(&state.text);
    let page_number = state
        .value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| text.clone());
    Some(PageReference {
        absolute_order: state.play_order.unwrap_or(encountered),
        page_number,
        page_type: state.page_type.as_deref().map(PageType::from_attr).unwrap_or_default(),
        timing_ref,
        text,
        audio_clip: state.audio,
    })
}
