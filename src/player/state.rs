//! The phrase pipeline state machine.
//!
//! A request resolves the current element's timing document (reusing the
//! cached one when the path matches), then its audio file, and delivers one
//! [`Phrase`]. Completions from superseded requests are dropped.

use std::io;
use std::sync::Arc;

use futures::FutureExt;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tracing::{debug, trace, warn};

use super::{AudioClip, AudioSource, Phrase, PhraseConstructionKit, PhrasePresenter, PlayerMode, Stage};
use crate::config::ReaderConfig;
use crate::error::Error;
use crate::io::ResourceLoader;
use crate::navigator::BookNavigator;
use crate::smil::{TimingDocument, split_timing_ref};
use crate::util::decode_xml;

/// Which of the two chained loads a completion belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadKind {
    TimingDoc,
    Audio,
}

/// A finished resource load, tagged with the request that issued it.
struct Completion {
    request_id: u64,
    kind: LoadKind,
    path: String,
    result: io::Result<Vec<u8>>,
}

/// The phrase pipeline.
///
/// Each [`PlayerState::request_phrase`] starts a new construction cycle and
/// supersedes any cycle still in flight. Loads run as one-shot futures that
/// are polled only from [`PlayerState::pump`], so every state change happens
/// on the caller's task. A completion is acted on only if it carries the
/// current request id and the path the current cycle is waiting for;
/// anything else is dropped.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use talkbook::{Book, BookNavigator, DirectoryLoader, PlayerState, ReaderConfig};
/// # async fn run(book: Arc<Book>) {
/// let config = ReaderConfig::default();
/// let navigator = BookNavigator::new(book, &config);
/// let loader = Arc::new(DirectoryLoader::new("books/new_zealand"));
/// let mut player = PlayerState::new(loader, |phrase: talkbook::Phrase, _resume: bool| {
///     println!("{}", phrase.text);
/// }, &config);
/// player.request_phrase(&navigator);
/// player.settle().await;
/// # }
/// ```
pub struct PlayerState<P> {
    loader: Arc<dyn ResourceLoader>,
    presenter: P,
    image_prefix: String,
    mode: PlayerMode,
    stage: Stage,
    /// Generation counter; bumped by every request.
    request_id: u64,
    kit: Option<PhraseConstructionKit>,
    timing_doc: Option<TimingDocument>,
    expected_timing_path: Option<String>,
    expected_audio_path: Option<String>,
    last_timing_ref: Option<String>,
    pending: FuturesUnordered<BoxFuture<'static, Completion>>,
}

impl<P: PhrasePresenter> PlayerState<P> {
    pub fn new(loader: Arc<dyn ResourceLoader>, presenter: P, config: &ReaderConfig) -> Self {
        Self {
            loader,
            presenter,
            image_prefix: config.image_prefix.clone(),
            mode: PlayerMode::default(),
            stage: Stage::Idle,
            request_id: 0,
            kit: None,
            timing_doc: None,
            expected_timing_path: None,
            expected_audio_path: None,
            last_timing_ref: None,
            pending: FuturesUnordered::new(),
        }
    }

    pub fn mode(&self) -> PlayerMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PlayerMode) {
        debug!(%mode, "player mode");
        self.mode = mode;
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// No loads are in flight, current or stale.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    /// Path of the timing document currently held.
    pub fn active_timing_path(&self) -> Option<&str> {
        self.timing_doc.as_ref().map(TimingDocument::path)
    }

    /// Id of the most recent request.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Start building the phrase for the navigator's current element.
    ///
    /// Content without a timing reference is delivered before this returns.
    /// Otherwise the timing document (unless already held) and then the audio
    /// are requested; drive them with [`PlayerState::pump`] or
    /// [`PlayerState::settle`].
    pub fn request_phrase(&mut self, navigator: &BookNavigator) {
        self.request_id += 1;
        let request_id = self.request_id;
        self.kit = None;
        self.expected_timing_path = None;
        self.expected_audio_path = None;

        let Some(node) = navigator.current_element() else {
            debug!(request_id, "no current element");
            self.stage = Stage::Idle;
            return;
        };

        let dom = navigator.book().dom();
        let element_id = dom.element_id(node).unwrap_or_default().to_string();
        let alt = dom.alt_text(node);
        let mut text = dom.text_content(node);
        if text.is_empty()
            && let Some(alt) = alt
        {
            text = format!("{}{alt}", self.image_prefix);
        }

        let timing_ref = dom.timing_ref(node).map(str::to_string);
        let can_resume = self.mode == PlayerMode::Paused
            && timing_ref.is_some()
            && timing_ref == self.last_timing_ref;
        self.last_timing_ref = timing_ref.clone();

        let Some(timing_ref) = timing_ref else {
            let phrase = match alt {
                Some(alt) => Phrase::new(element_id, format!("{}{alt}", self.image_prefix), None),
                None => Phrase::silent(element_id, text),
            };
            self.deliver(phrase, can_resume);
            return;
        };

        let (timing_doc_path, local_ref_id) = split_timing_ref(&timing_ref);
        debug!(request_id, %timing_ref, "phrase requested");
        self.kit = Some(PhraseConstructionKit {
            request_id,
            element_id,
            text,
            timing_ref,
            timing_doc_path: timing_doc_path.clone(),
            local_ref_id,
            audio_clip: None,
            can_resume,
        });

        if self.active_timing_path() == Some(timing_doc_path.as_str()) {
            trace!(path = %timing_doc_path, "timing document already loaded");
            self.resolve_audio();
        } else {
            self.stage = Stage::AwaitingTimingDoc;
            self.expected_timing_path = Some(timing_doc_path.clone());
            self.start_load(request_id, LoadKind::TimingDoc, timing_doc_path);
        }
    }

    /// Wait for the next load to finish and process it.
    ///
    /// Returns false when nothing is in flight.
    pub async fn pump(&mut self) -> bool {
        match self.pending.next().await {
            Some(completion) => {
                self.complete(completion);
                true
            }
            None => false,
        }
    }

    /// Process loads until none remain in flight.
    pub async fn settle(&mut self) {
        while self.pump().await {}
    }

    fn start_load(&mut self, request_id: u64, kind: LoadKind, path: String) {
        debug!(request_id, ?kind, %path, "loading");
        let open = self.loader.open(&path);
        self.pending.push(
            async move {
                let result = open.await;
                Completion {
                    request_id,
                    kind,
                    path,
                    result,
                }
            }
            .boxed(),
        );
    }

    fn is_current(&self, completion: &Completion) -> bool {
        let expected = match completion.kind {
            LoadKind::TimingDoc => &self.expected_timing_path,
            LoadKind::Audio => &self.expected_audio_path,
        };
        self.kit.as_ref().map(|kit| kit.request_id) == Some(completion.request_id)
            && expected.as_deref() == Some(completion.path.as_str())
    }

    fn complete(&mut self, completion: Completion) {
        match completion.kind {
            LoadKind::TimingDoc => self.complete_timing_doc(completion),
            LoadKind::Audio => self.complete_audio(completion),
        }
    }

    fn complete_timing_doc(&mut self, completion: Completion) {
        let current = self.is_current(&completion);
        let parsed = completion.result.map_err(Error::from).and_then(|bytes| {
            TimingDocument::parse(&completion.path, &decode_xml(&bytes))
        });

        match parsed {
            // A stale document is still kept; the next request for the same
            // path can use it.
            Ok(doc) => self.timing_doc = Some(doc),
            Err(e) if current => {
                warn!(path = %completion.path, error = %e, "timing document failed to load");
                self.abandon();
                return;
            }
            Err(e) => {
                trace!(path = %completion.path, error = %e, "stale timing document failed");
                return;
            }
        }

        if current {
            self.resolve_audio();
        } else {
            trace!(
                request_id = completion.request_id,
                path = %completion.path,
                "discarding stale timing document"
            );
        }
    }

    /// Look up the current kit's clip and start loading its audio.
    fn resolve_audio(&mut self) {
        let Some(kit) = self.kit.as_mut() else {
            return;
        };
        let clip = self
            .timing_doc
            .as_ref()
            .and_then(|doc| doc.clip_for(&kit.local_ref_id))
            .cloned();

        let Some(clip) = clip else {
            debug!(timing_ref = %kit.timing_ref, "no audio clip, delivering silent phrase");
            if let Some(kit) = self.kit.take() {
                let can_resume = kit.can_resume;
                self.deliver(kit.into_phrase(None), can_resume);
            }
            return;
        };

        let request_id = kit.request_id;
        let path = clip.source.path().to_string();
        kit.audio_clip = Some(clip);
        self.stage = Stage::AwaitingAudio;
        self.expected_audio_path = Some(path.clone());
        self.start_load(request_id, LoadKind::Audio, path);
    }

    fn complete_audio(&mut self, completion: Completion) {
        if !self.is_current(&completion) {
            trace!(
                request_id = completion.request_id,
                path = %completion.path,
                "discarding stale audio"
            );
            return;
        }

        let data = match completion.result {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %completion.path, error = %e, "audio failed to load");
                self.abandon();
                return;
            }
        };

        let Some(mut kit) = self.kit.take() else {
            return;
        };
        let clip = kit.audio_clip.take().map(|clip| {
            let data: Arc<[u8]> = Arc::from(data);
            AudioClip::new(
                AudioSource::Stream {
                    path: completion.path,
                    data,
                },
                clip.clip_start,
                clip.clip_end,
            )
        });
        let can_resume = kit.can_resume;
        self.deliver(kit.into_phrase(clip), can_resume);
    }

    fn abandon(&mut self) {
        self.kit = None;
        self.expected_timing_path = None;
        self.expected_audio_path = None;
        self.stage = Stage::Idle;
    }

    fn deliver(&mut self, phrase: Phrase, can_resume: bool) {
        debug!(
            request_id = self.request_id,
            element = %phrase.element_id,
            silent = phrase.is_silent,
            can_resume,
            "presenting phrase"
        );
        self.kit = None;
        self.expected_timing_path = None;
        self.expected_audio_path = None;
        self.stage = Stage::Delivered;
        self.presenter.present_phrase(phrase, can_resume);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::book::Book;
    use crate::io::MemoryLoader;

    const DOC: &str = r#"<dtbook><book><bodymatter><level1>
      <h1 id="h1" smilref="smil/one.smil#h1">Aotearoa</h1>
      <p><sent id="s1" smilref="smil/one.smil#s1">Long white cloud.</sent>
         <sent id="s2" smilref="smil/one.smil#s2">No audio here.</sent>
         <sent id="s3" smilref="smil/two.smil#s3">Second file.</sent></p>
      <imggroup><img src="fern.png" alt="Silver fern"/></imggroup>
    </level1></bodymatter></book></dtbook>"#;

    const SMIL_ONE: &str = r#"<smil><body><seq>
      <par id="h1"><text src="book.xml#h1"/><audio src="../audio/one.mp3" clipBegin="0:00:00.000" clipEnd="0:00:01.500"/></par>
      <par id="s1"><text src="book.xml#s1"/><audio src="../audio/one.mp3" clipBegin="0:00:01.500" clipEnd="0:00:04.000"/></par>
      <par id="s2"><text src="book.xml#s2"/></par>
    </seq></body></smil>"#;

    const SMIL_TWO: &str = r#"<smil><body><seq>
      <par id="s3"><text src="book.xml#s3"/><audio src="../audio/two.mp3" clipBegin="2s" clipEnd="3s"/></par>
    </seq></body></smil>"#;

    type Delivered = Rc<RefCell<Vec<(Phrase, bool)>>>;

    fn setup(loader: MemoryLoader) -> (BookNavigator, PlayerState<impl PhrasePresenter>, Delivered) {
        let config = ReaderConfig::default();
        let book = Book::from_xml(DOC, None, &config).unwrap();
        let navigator = BookNavigator::new(Arc::new(book), &config);
        let delivered: Delivered = Rc::default();
        let sink = Rc::clone(&delivered);
        let player = PlayerState::new(
            Arc::new(loader),
            move |phrase: Phrase, resume: bool| sink.borrow_mut().push((phrase, resume)),
            &config,
        );
        (navigator, player, delivered)
    }

    fn full_loader() -> MemoryLoader {
        MemoryLoader::new()
            .with("smil/one.smil", SMIL_ONE)
            .with("smil/two.smil", SMIL_TWO)
            .with("audio/one.mp3", b"ONE".to_vec())
            .with("audio/two.mp3", b"TWO".to_vec())
    }

    #[tokio::test]
    async fn test_phrase_with_audio() {
        let (navigator, mut player, delivered) = setup(full_loader());
        player.request_phrase(&navigator);
        assert_eq!(player.stage(), Stage::AwaitingTimingDoc);
        player.settle().await;

        let delivered = delivered.borrow();
        assert_eq!(delivered.len(), 1);
        let (phrase, resume) = &delivered[0];
        assert!(!resume);
        assert_eq!(phrase.element_id, "h1");
        assert_eq!(phrase.text, "Aotearoa");
        assert!(!phrase.is_silent);
        let clip = phrase.audio_clip.as_ref().unwrap();
        assert_eq!(clip.source.path(), "audio/one.mp3");
        assert_eq!(clip.source.data(), Some(&b"ONE"[..]));
        assert_eq!(clip.clip_end, Duration::from_millis(1500));
        assert_eq!(player.stage(), Stage::Delivered);
        assert_eq!(player.active_timing_path(), Some("smil/one.smil"));
    }

    #[tokio::test]
    async fn test_cached_timing_document_skips_load() {
        let (mut navigator, mut player, delivered) = setup(full_loader());
        player.request_phrase(&navigator);
        player.settle().await;

        navigator.move_next();
        player.request_phrase(&navigator);
        assert_eq!(player.stage(), Stage::AwaitingAudio);
        player.settle().await;
        assert_eq!(delivered.borrow().len(), 2);
        assert_eq!(delivered.borrow()[1].0.element_id, "s1");
    }

    #[tokio::test]
    async fn test_missing_clip_is_silent() {
        let (mut navigator, mut player, delivered) = setup(full_loader());
        navigator.seek_to_element_id("s2").unwrap();
        player.request_phrase(&navigator);
        player.settle().await;

        let delivered = delivered.borrow();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].0.is_silent);
        assert!(delivered[0].0.audio_clip.is_none());
        assert_eq!(delivered[0].0.text, "No audio here.");
    }

    #[tokio::test]
    async fn test_alt_text_delivered_immediately() {
        let (mut navigator, mut player, delivered) = setup(full_loader());
        navigator.seek_to_end();
        player.request_phrase(&navigator);
        assert!(player.is_idle());
        assert_eq!(player.stage(), Stage::Delivered);

        let delivered = delivered.borrow();
        assert_eq!(delivered[0].0.text, "Image. Silver fern");
        assert!(!delivered[0].0.is_silent);
        assert!(delivered[0].0.audio_clip.is_none());
    }

    #[tokio::test]
    async fn test_superseded_request_is_discarded() {
        let (mut navigator, mut player, delivered) = setup(full_loader());
        player.request_phrase(&navigator);
        navigator.seek_to_element_id("s3").unwrap();
        player.request_phrase(&navigator);
        player.settle().await;

        let delivered = delivered.borrow();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0.element_id, "s3");
        assert_eq!(delivered[0].0.audio_clip.as_ref().unwrap().source.path(), "audio/two.mp3");
    }

    #[tokio::test]
    async fn test_load_failure_delivers_nothing() {
        let loader = MemoryLoader::new().with("smil/one.smil", SMIL_ONE);
        let (navigator, mut player, delivered) = setup(loader);
        player.request_phrase(&navigator);
        player.settle().await;
        assert!(delivered.borrow().is_empty());
        assert_eq!(player.stage(), Stage::Idle);

        let (navigator, mut player, delivered) = setup(MemoryLoader::new());
        player.request_phrase(&navigator);
        player.settle().await;
        assert!(delivered.borrow().is_empty());
        assert!(player.active_timing_path().is_none());
    }

    #[tokio::test]
    async fn test_resume_only_when_paused_on_same_reference() {
        let (mut navigator, mut player, delivered) = setup(full_loader());
        player.request_phrase(&navigator);
        player.settle().await;

        player.set_mode(PlayerMode::Paused);
        player.request_phrase(&navigator);
        player.settle().await;

        navigator.move_next();
        player.request_phrase(&navigator);
        player.settle().await;

        let resumes: Vec<bool> = delivered.borrow().iter().map(|(_, r)| *r).collect();
        assert_eq!(resumes, vec![false, true, false]);
    }
}
