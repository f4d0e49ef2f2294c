//! Phrase pipeline tests against the New Zealand sample book.
//!
//! `GatedLoader` holds every load until the test releases it, so the order
//! in which completions arrive is under the test's control.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;

use talkbook::{
    Book, BookNavigator, DirectoryLoader, MemoryLoader, Phrase, PhrasePresenter, PlayerMode, PlayerState,
    ReaderConfig, ResourceLoader, Stage,
};

const FIXTURES_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/new_zealand");

fn fixture_path(name: &str) -> String {
    format!("{}/{}", FIXTURES_DIR, name)
}

fn navigator() -> BookNavigator {
    let config = ReaderConfig::default();
    let ncx = fixture_path("navigation.ncx");
    let book = Book::open(fixture_path("dtbook.xml"), Some(Path::new(&ncx)), &config)
        .expect("Failed to open sample book");
    BookNavigator::new(Arc::new(book), &config)
}

/// Loads resources from the fixture directory, each held back until released.
struct GatedLoader {
    inner: MemoryLoader,
    gates: Mutex<HashMap<String, Vec<oneshot::Sender<()>>>>,
}

impl GatedLoader {
    fn new() -> Self {
        let mut inner = MemoryLoader::new();
        for name in ["speechgen0001.smil", "speechgen0002.smil", "speechgen0001.mp3", "speechgen0002.mp3"] {
            inner.insert(name, std::fs::read(fixture_path(name)).unwrap());
        }
        Self {
            inner,
            gates: Mutex::default(),
        }
    }

    /// Let the oldest pending load of `path` complete.
    fn release(&self, path: &str) {
        let mut gates = self.gates.lock().unwrap();
        let waiting = gates.get_mut(path).expect("no load pending for path");
        assert!(!waiting.is_empty(), "no load pending for {path}");
        let _ = waiting.remove(0).send(());
    }

    fn pending(&self, path: &str) -> usize {
        self.gates.lock().unwrap().get(path).map_or(0, Vec::len)
    }
}

impl ResourceLoader for GatedLoader {
    fn open(&self, path: &str) -> BoxFuture<'static, io::Result<Vec<u8>>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().entry(path.to_string()).or_default().push(tx);
        let load = self.inner.open(path);
        async move {
            let _ = rx.await;
            load.await
        }
        .boxed()
    }
}

type Delivered = Rc<RefCell<Vec<(Phrase, bool)>>>;

fn player(loader: Arc<dyn ResourceLoader>) -> (PlayerState<impl PhrasePresenter>, Delivered) {
    let delivered: Delivered = Rc::default();
    let sink = Rc::clone(&delivered);
    let player = PlayerState::new(
        loader,
        move |phrase: Phrase, resume: bool| sink.borrow_mut().push((phrase, resume)),
        &ReaderConfig::default(),
    );
    (player, delivered)
}

// ============================================================================
// Stale Discard
// ============================================================================

#[tokio::test]
async fn test_superseded_timing_document_is_discarded() {
    let loader = Arc::new(GatedLoader::new());
    let (mut player, delivered) = player(loader.clone());
    let mut nav = navigator();

    // A: first page number, in speechgen0001.smil
    player.request_phrase(&nav);
    // B: a sentence in speechgen0002.smil, requested before A's document arrives
    nav.set_current_element_id("ghGen23").unwrap();
    player.request_phrase(&nav);

    // B's document lands first, then its audio.
    loader.release("speechgen0002.smil");
    assert!(player.pump().await);
    assert_eq!(player.stage(), Stage::AwaitingAudio);
    loader.release("speechgen0002.mp3");
    assert!(player.pump().await);
    assert_eq!(delivered.borrow().len(), 1);

    // A's document arrives late and must not produce a phrase.
    loader.release("speechgen0001.smil");
    assert!(player.pump().await);
    assert!(!player.pump().await);
    assert_eq!(loader.pending("speechgen0001.mp3"), 0);

    let delivered = delivered.borrow();
    assert_eq!(delivered.len(), 1);
    let (phrase, _) = &delivered[0];
    assert_eq!(phrase.element_id, "ghGen23");
    assert_eq!(phrase.text, "Polynesian settlers arrived around 1300 AD.");
    assert_eq!(phrase.audio_clip.as_ref().unwrap().source.path(), "speechgen0002.mp3");
}

#[tokio::test]
async fn test_superseded_audio_is_discarded() {
    let loader = Arc::new(GatedLoader::new());
    let (mut player, delivered) = player(loader.clone());
    let mut nav = navigator();

    nav.set_current_element_id("ghGen5").unwrap();
    player.request_phrase(&nav);
    loader.release("speechgen0001.smil");
    assert!(player.pump().await);
    assert_eq!(player.stage(), Stage::AwaitingAudio);

    // Same timing document and same audio file, different clip.
    nav.move_next();
    player.request_phrase(&nav);
    assert_eq!(player.stage(), Stage::AwaitingAudio);
    assert_eq!(loader.pending("speechgen0001.mp3"), 2);

    loader.release("speechgen0001.mp3");
    loader.release("speechgen0001.mp3");
    player.settle().await;

    let delivered = delivered.borrow();
    assert_eq!(delivered.len(), 1);
    let clip = delivered[0].0.audio_clip.as_ref().unwrap();
    assert_eq!(delivered[0].0.element_id, "ghGen6");
    assert_eq!(clip.clip_start, Duration::from_millis(6500));
    assert_eq!(clip.clip_end, Duration::from_millis(10250));
}

#[tokio::test]
async fn test_same_document_requested_twice_uses_request_id() {
    let loader = Arc::new(GatedLoader::new());
    let (mut player, delivered) = player(loader.clone());
    let mut nav = navigator();

    // Both requests wait on speechgen0001.smil; only the second may deliver.
    player.request_phrase(&nav);
    nav.move_next();
    player.request_phrase(&nav);
    assert_eq!(loader.pending("speechgen0001.smil"), 2);

    loader.release("speechgen0001.smil");
    assert!(player.pump().await);
    assert!(delivered.borrow().is_empty());

    loader.release("speechgen0001.smil");
    assert!(player.pump().await);
    loader.release("speechgen0001.mp3");
    player.settle().await;

    let delivered = delivered.borrow();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0.element_id, "ghGen3");
}

// ============================================================================
// Phrase Content
// ============================================================================

#[tokio::test]
async fn test_walk_with_directory_loader() {
    let loader = Arc::new(DirectoryLoader::new(FIXTURES_DIR));
    let (mut player, delivered) = player(loader);
    let mut nav = navigator();

    loop {
        player.request_phrase(&nav);
        player.settle().await;
        nav.move_next();
        if nav.at_end_of_book() {
            break;
        }
    }

    let delivered = delivered.borrow();
    assert_eq!(delivered.len(), 15);
    assert!(delivered.iter().all(|(_, resume)| !resume));

    let by_id: HashMap<&str, &Phrase> = delivered
        .iter()
        .map(|(p, _)| (p.element_id.as_str(), p))
        .collect();

    let heading = by_id["ghGen3"];
    assert_eq!(heading.text, "Geography");
    let clip = heading.audio_clip.as_ref().unwrap();
    assert_eq!(clip.clip_start, Duration::from_millis(2000));
    assert_eq!(clip.clip_end, Duration::from_millis(3100));
    assert!(clip.source.data().unwrap().starts_with(b"ID3"));

    // Page 1 has no audio in its timing document.
    let page = by_id["gh_pageRef2"];
    assert!(page.is_silent);
    assert!(page.audio_clip.is_none());

    let image = by_id["talkbook-alt-1"];
    assert_eq!(image.text, "Image. Aoraki / Mount Cook under snow");
    assert!(!image.is_silent);
    assert!(image.audio_clip.is_none());

    assert_eq!(by_id["ghGen8"].text, "Mountains & Lakes");
}

#[tokio::test]
async fn test_paused_on_same_reference_resumes() {
    let loader = Arc::new(DirectoryLoader::new(FIXTURES_DIR));
    let (mut player, delivered) = player(loader);
    let mut nav = navigator();

    player.set_mode(PlayerMode::Playing);
    player.request_phrase(&nav);
    player.settle().await;

    player.set_mode(PlayerMode::Paused);
    player.request_phrase(&nav);
    player.settle().await;

    nav.move_next();
    player.request_phrase(&nav);
    player.settle().await;

    let resumes: Vec<bool> = delivered.borrow().iter().map(|(_, r)| *r).collect();
    assert_eq!(resumes, vec![false, true, false]);
}

#[tokio::test]
async fn test_missing_resource_delivers_nothing() {
    let loader = Arc::new(MemoryLoader::new());
    let (mut player, delivered) = player(loader);
    let nav = navigator();

    player.request_phrase(&nav);
    player.settle().await;
    assert!(delivered.borrow().is_empty());
    assert_eq!(player.stage(), Stage::Idle);
    assert!(player.is_idle());
}
