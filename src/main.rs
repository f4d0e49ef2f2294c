//! talkbook - inspect and walk DAISY talking books

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use talkbook::dom::TITLE_TAG;
use talkbook::{Book, BookNavigator, DirectoryLoader, Error, Phrase, PlayerState, ReaderConfig, Result};

#[derive(Parser)]
#[command(name = "talkbook")]
#[command(version, about = "Inspect and walk DAISY talking books", long_about = None)]
#[command(after_help = "EXAMPLES:
    talkbook book.xml --ncx navigation.ncx --toc     Show the table of contents
    talkbook book.xml --search kiwi                  Find text
    talkbook book.xml --walk --json                  Build every phrase with its audio")]
struct Cli {
    /// DTBook content document
    #[arg(value_name = "DTBOOK")]
    input: PathBuf,

    /// NCX navigation document
    #[arg(long, value_name = "FILE")]
    ncx: Option<PathBuf>,

    /// Reader configuration (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the table of contents
    #[arg(long)]
    toc: bool,

    /// Print the page list
    #[arg(long)]
    pages: bool,

    /// Print elements whose text contains TEXT
    #[arg(long, value_name = "TEXT")]
    search: Option<String>,

    /// Walk the whole book, building each phrase with its audio
    #[arg(long)]
    walk: bool,

    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "talkbook=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ReaderConfig::load(path)?,
        None => ReaderConfig::default(),
    };
    let book = Arc::new(Book::open(&cli.input, cli.ncx.as_deref(), &config)?);
    info!(
        elements = book.dom().len(),
        headings = book.toc().len(),
        pages = book.pages().len(),
        "book loaded"
    );
    let mut navigator = BookNavigator::new(Arc::clone(&book), &config);

    let mut acted = false;
    if cli.toc {
        show_toc(&book, cli.json)?;
        acted = true;
    }
    if cli.pages {
        show_pages(&book, cli.json)?;
        acted = true;
    }
    if let Some(query) = &cli.search {
        show_search(&navigator, query, cli.json)?;
        acted = true;
    }
    if cli.walk {
        let root = cli.input.parent().unwrap_or(Path::new("."));
        walk(&mut navigator, root, &config, cli.json).await?;
        acted = true;
    }
    if !acted {
        show_info(&cli.input, &book, &navigator, cli.json)?;
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| Error::Io(e.into()))?;
    println!("{text}");
    Ok(())
}

fn show_info(path: &Path, book: &Book, navigator: &BookNavigator, as_json: bool) -> Result<()> {
    let dom = book.dom();
    let title = dom
        .elements()
        .find(|&n| dom.element_name(n) == Some(TITLE_TAG))
        .map(|n| dom.text_content(n))
        .unwrap_or_default();
    let speakable = dom.elements().filter(|&n| dom.is_speakable(n)).count();
    let first = navigator.first_element().and_then(|n| dom.element_id(n));
    let last = navigator.last_element().and_then(|n| dom.element_id(n));

    if as_json {
        return print_json(&json!({
            "file": path.display().to_string(),
            "title": title,
            "speakable": speakable,
            "headings": book.toc().len(),
            "pages": book.pages().len(),
            "first": first,
            "last": last,
        }));
    }

    println!("File: {}", path.display());
    if !title.is_empty() {
        println!("Title: {title}");
    }
    println!("Speakable elements: {speakable}");
    println!("Headings: {}", book.toc().len());
    println!("Pages: {}", book.pages().len());
    if let (Some(first), Some(last)) = (first, last) {
        println!("Range: {first} .. {last}");
    }
    Ok(())
}

fn show_toc(book: &Book, as_json: bool) -> Result<()> {
    if as_json {
        let value = serde_json::to_value(book.toc().headings()).map_err(|e| Error::Io(e.into()))?;
        return print_json(&value);
    }
    for heading in book.toc().flat() {
        let indent = "  ".repeat(usize::from(heading.level.saturating_sub(1)));
        println!("{indent}{} [{}]", heading.text, heading.timing_ref);
    }
    Ok(())
}

fn show_pages(book: &Book, as_json: bool) -> Result<()> {
    if as_json {
        let value = serde_json::to_value(book.pages().pages()).map_err(|e| Error::Io(e.into()))?;
        return print_json(&value);
    }
    for page in book.pages().pages() {
        println!("{:>6}  {:?}  {}", page.page_number, page.page_type, page.timing_ref);
    }
    Ok(())
}

fn show_search(navigator: &BookNavigator, query: &str, as_json: bool) -> Result<()> {
    let dom = navigator.book().dom();
    let hits: Vec<(&str, String)> = navigator
        .search_for_string(query)
        .into_iter()
        .map(|n| (dom.element_id(n).unwrap_or(""), dom.text_content(n)))
        .collect();

    if as_json {
        let value = hits
            .iter()
            .map(|(id, text)| json!({ "id": id, "text": text }))
            .collect();
        return print_json(&serde_json::Value::Array(value));
    }
    for (id, text) in &hits {
        println!("{id}: {text}");
    }
    println!("{} match(es)", hits.len());
    Ok(())
}

async fn walk(navigator: &mut BookNavigator, root: &Path, config: &ReaderConfig, as_json: bool) -> Result<()> {
    let loader = Arc::new(DirectoryLoader::new(root));
    let mut phrases: Vec<Phrase> = Vec::new();
    let mut player = PlayerState::new(loader, |phrase: Phrase, _resume: bool| phrases.push(phrase), config);

    navigator.seek_to_start();
    while navigator.current_element().is_some() {
        player.request_phrase(navigator);
        player.settle().await;
        navigator.move_next();
        if navigator.at_end_of_book() {
            break;
        }
    }
    drop(player);

    if as_json {
        let value = phrases
            .iter()
            .map(|p| {
                let audio = p.audio_clip.as_ref().map(|clip| {
                    json!({
                        "path": clip.source.path(),
                        "bytes": clip.source.data().map_or(0, <[u8]>::len),
                        "start_ms": clip.clip_start.as_millis() as u64,
                        "end_ms": clip.clip_end.as_millis() as u64,
                    })
                });
                json!({ "id": p.element_id, "text": p.text, "silent": p.is_silent, "audio": audio })
            })
            .collect();
        return print_json(&serde_json::Value::Array(value));
    }

    for phrase in &phrases {
        match &phrase.audio_clip {
            Some(clip) => println!(
                "{}: {} [{} {:.3}-{:.3}]",
                phrase.element_id,
                phrase.text,
                clip.source.path(),
                clip.clip_start.as_secs_f64(),
                clip.clip_end.as_secs_f64()
            ),
            None => println!("{}: {} [silent]", phrase.element_id, phrase.text),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURES_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/new_zealand");

    fn cli(extra: &[&str]) -> Cli {
        let dtbook = format!("{FIXTURES_DIR}/dtbook.xml");
        let ncx = format!("{FIXTURES_DIR}/navigation.ncx");
        let mut args = vec!["talkbook".to_string(), dtbook, "--ncx".to_string(), ncx];
        args.extend(extra.iter().map(|s| s.to_string()));
        Cli::try_parse_from(args).unwrap()
    }

    #[tokio::test]
    async fn test_walk_then_listings() {
        run(cli(&["--walk", "--toc", "--pages", "--search", "Waitangi"])).await.unwrap();
    }

    #[tokio::test]
    async fn test_default_info() {
        run(cli(&["--json"])).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_input_fails() {
        let parsed = Cli::try_parse_from(["talkbook", "no/such/book.xml"]).unwrap();
        assert!(run(parsed).await.is_err());
    }
}
