//! E-reader variant: a book page with a chapter picker, plus a full-screen
//! reading mode that pages through the chapter in fixed-size fragments.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::device::{DeviceEvent, OsEventType};
use crate::layout::{paginate, READING_FRAGMENT_CHARS};
use crate::reconciler::Reconciliation;
use crate::surface::{
    ListItems, ListRegion, RegionFrame, RegionPatch, RemoteContainerSpec, SurfaceOp, TextRegion,
};

pub const CHAPTERS_ID: u32 = 1;
pub const INFO_ID: u32 = 2;
pub const CONTENT_ID: u32 = 3;
pub const CHAPTER_ID: u32 = 4;

pub const CHAPTERS_NAME: &str = "chapters";
pub const INFO_NAME: &str = "info";
pub const CONTENT_NAME: &str = "content";
pub const CHAPTER_NAME: &str = "chapter";

const PREVIEW_CHARS: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub index: u32,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub had_read: bool,
}

impl Chapter {
    /// First 25 characters of the content, with `...` when truncated.
    pub fn preview(&self) -> String {
        if self.content.chars().count() > PREVIEW_CHARS {
            let head: String = self.content.chars().take(PREVIEW_CHARS).collect();
            format!("{head}...")
        } else {
            self.content.clone()
        }
    }

    fn summary(&self) -> String {
        format!(
            "{}\n\n{}\n\nDouble-click for full screen >>",
            self.title,
            self.preview()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub read_chapters: u32,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl Book {
    fn placeholder(id: &str, title: &str, author: &str, kind: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            author: author.to_string(),
            kind: kind.to_string(),
            read_chapters: 0,
            chapters: Vec::new(),
        }
    }

    /// Shelf used when no book file can be loaded.
    pub fn default_shelf() -> Vec<Book> {
        vec![
            Book::placeholder("book_001", "The Martial Demon Chronicles", "Z. Wang", "Fantasy"),
            Book::placeholder("book_002", "Tales of Mythic Seas", "Nan Yan", "Adventure"),
            Book::placeholder("book_003", "Nightwalker's Notes", "Lu Li", "Mystery"),
        ]
    }

    pub fn byline(&self) -> String {
        format!("{} -- {}", self.title, self.author)
    }
}

/// Cursor over one chapter's fragments while reading full screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingSession {
    pub book_id: String,
    pub chapter_index: usize,
    fragments: Vec<String>,
    fragment_index: usize,
}

impl ReadingSession {
    pub fn new(book_id: &str, chapter_index: usize, content: &str) -> Self {
        Self {
            book_id: book_id.to_string(),
            chapter_index,
            fragments: paginate(content, READING_FRAGMENT_CHARS),
            fragment_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn fragment_index(&self) -> usize {
        self.fragment_index
    }

    pub fn current(&self) -> Option<&str> {
        self.fragments.get(self.fragment_index).map(String::as_str)
    }

    /// Moves to the next fragment; `None` when already on the last one.
    pub fn advance(&mut self) -> Option<&str> {
        if self.fragment_index + 1 >= self.fragments.len() {
            return None;
        }
        self.fragment_index += 1;
        self.current()
    }

    /// Moves to the previous fragment; `None` when already on the first one.
    pub fn retreat(&mut self) -> Option<&str> {
        if self.fragment_index == 0 || self.fragments.is_empty() {
            return None;
        }
        self.fragment_index -= 1;
        self.current()
    }
}

/// Drives the reader surface from device interactions.
#[derive(Debug)]
pub struct ReaderController {
    books: Vec<Book>,
    current_book: Option<usize>,
    chapter_index: usize,
    session: Option<ReadingSession>,
    surface_created: bool,
}

impl ReaderController {
    pub fn new(books: Vec<Book>) -> Self {
        Self {
            books,
            current_book: None,
            chapter_index: 0,
            session: None,
            surface_created: false,
        }
    }

    pub fn books(&self) -> &[Book] {
        &self.books
    }

    pub fn current_book(&self) -> Option<&Book> {
        self.current_book.and_then(|idx| self.books.get(idx))
    }

    pub fn chapter_index(&self) -> usize {
        self.chapter_index
    }

    pub fn session(&self) -> Option<&ReadingSession> {
        self.session.as_ref()
    }

    pub fn is_full_screen(&self) -> bool {
        self.session.is_some()
    }

    /// Shows the book page for `book_id` starting at its first chapter.
    ///
    /// Creates the surface on first use and rebuilds it afterwards.
    pub fn start_book(&mut self, book_id: &str) -> Reconciliation {
        let Some(idx) = self.books.iter().position(|book| book.id == book_id) else {
            return status(format!("Book not found: {book_id}"));
        };
        self.current_book = Some(idx);
        self.chapter_index = 0;
        self.session = None;

        let book = &self.books[idx];
        info!(book = %book.id, chapters = book.chapters.len(), "opening book");
        let spec = book_page(book, self.chapter_index);
        let op = if self.surface_created {
            SurfaceOp::Rebuild(spec)
        } else {
            self.surface_created = true;
            SurfaceOp::Initialize(spec)
        };
        Reconciliation {
            op: Some(op),
            status: Some(format!("Reading: {}", book.byline())),
            schedule: None,
        }
    }

    pub fn handle_event(&mut self, event: &DeviceEvent) -> Reconciliation {
        match event {
            DeviceEvent::List { selected_index, .. } => match selected_index {
                Some(index) => self.select_chapter(*index),
                None => Reconciliation::default(),
            },
            DeviceEvent::Text { event_type, .. } => match event_type {
                Some(OsEventType::ScrollBottom) => self.scroll(true),
                Some(OsEventType::ScrollTop) => self.scroll(false),
                Some(OsEventType::DoubleClick) => self.toggle_full_screen(),
                _ => Reconciliation::default(),
            },
            DeviceEvent::System { event_type } => match event_type {
                Some(OsEventType::DoubleClick) => self.toggle_full_screen(),
                Some(OsEventType::ForegroundEnter) => {
                    info!("reader entered foreground");
                    Reconciliation::default()
                }
                Some(OsEventType::ForegroundExit) => {
                    info!("reader exited foreground");
                    Reconciliation::default()
                }
                Some(OsEventType::AbnormalExit) => {
                    info!("reader abnormal exit");
                    Reconciliation::default()
                }
                _ => Reconciliation::default(),
            },
        }
    }

    /// Switches the previewed chapter, leaving full-screen mode if needed.
    pub fn select_chapter(&mut self, index: i64) -> Reconciliation {
        let Some(book) = self.current_book() else {
            return Reconciliation::default();
        };
        let chapter = usize::try_from(index)
            .ok()
            .filter(|idx| *idx < book.chapters.len());
        let Some(chapter) = chapter else {
            return status(format!("Invalid chapter index: {index}"));
        };

        let was_reading = self.session.take().is_some();
        self.chapter_index = chapter;
        let Some(book) = self.current_book() else {
            return Reconciliation::default();
        };

        let op = if was_reading {
            SurfaceOp::Rebuild(book_page(book, chapter))
        } else {
            SurfaceOp::Patch(RegionPatch::new(
                CONTENT_ID,
                CONTENT_NAME,
                book.chapters[chapter].summary(),
            ))
        };
        self.gated(op)
    }

    /// Enters full-screen reading for the current chapter, or leaves it.
    pub fn toggle_full_screen(&mut self) -> Reconciliation {
        let Some(book) = self.current_book.and_then(|idx| self.books.get(idx)) else {
            return Reconciliation::default();
        };

        if self.session.take().is_some() {
            debug!(book = %book.id, "leaving full screen");
            let op = SurfaceOp::Rebuild(book_page(book, self.chapter_index));
            return self.gated(op);
        }

        let Some(chapter) = book.chapters.get(self.chapter_index) else {
            return status(format!("No chapter to read in {}", book.title));
        };
        let session = ReadingSession::new(&book.id, self.chapter_index, &chapter.content);
        debug!(
            book = %book.id,
            chapter = chapter.index,
            fragments = session.len(),
            "entering full screen"
        );
        let spec = reading_page(session.current().unwrap_or_default());
        self.session = Some(session);
        self.gated(SurfaceOp::Rebuild(spec))
    }

    fn scroll(&mut self, forward: bool) -> Reconciliation {
        let Some(session) = self.session.as_mut() else {
            debug!("scroll ignored outside full screen");
            return Reconciliation::default();
        };
        let fragment = if forward {
            session.advance()
        } else {
            session.retreat()
        }
        .map(str::to_string);
        match fragment {
            Some(text) => {
                let op = SurfaceOp::Patch(RegionPatch::new(CHAPTER_ID, CHAPTER_NAME, text));
                self.gated(op)
            }
            None => {
                debug!(forward, "reached fragment boundary");
                Reconciliation::default()
            }
        }
    }

    /// Shuts the surface down.
    pub fn exit(&mut self) -> Reconciliation {
        self.session = None;
        let created = std::mem::replace(&mut self.surface_created, false);
        if !created {
            return Reconciliation::default();
        }
        Reconciliation {
            op: Some(SurfaceOp::Teardown { exit_mode: 0 }),
            ..Reconciliation::default()
        }
    }

    fn gated(&self, op: SurfaceOp) -> Reconciliation {
        Reconciliation {
            op: self.surface_created.then_some(op),
            ..Reconciliation::default()
        }
    }
}

fn status(message: String) -> Reconciliation {
    Reconciliation {
        status: Some(message),
        ..Reconciliation::default()
    }
}

/// Book info, chapter picker and the current chapter's summary.
pub fn book_page(book: &Book, chapter_index: usize) -> RemoteContainerSpec {
    let chapters = ListRegion {
        id: CHAPTERS_ID,
        name: CHAPTERS_NAME.to_string(),
        x: 0,
        y: 35,
        width: 110,
        height: 200,
        frame: Some(RegionFrame::rounded(5)),
        event_capture: true,
        items: ListItems {
            item_count: book.chapters.len(),
            item_width: 100,
            select_border: true,
            item_name: book
                .chapters
                .iter()
                .map(|chapter| format!("Ch {}", chapter.index))
                .collect(),
        },
    };

    let summary = book
        .chapters
        .get(chapter_index)
        .or_else(|| book.chapters.first())
        .map(Chapter::summary)
        .unwrap_or_default();

    RemoteContainerSpec {
        lists: vec![chapters],
        texts: vec![
            TextRegion::new(INFO_ID, INFO_NAME, 0, 0, 530, 30)
                .framed(RegionFrame::rounded(0))
                .content(book.byline()),
            TextRegion::new(CONTENT_ID, CONTENT_NAME, 115, 35, 415, 200)
                .framed(RegionFrame::rounded(12))
                .content(summary),
        ],
    }
}

pub fn reading_page(fragment: &str) -> RemoteContainerSpec {
    RemoteContainerSpec {
        lists: Vec::new(),
        texts: vec![TextRegion::new(CHAPTER_ID, CHAPTER_NAME, 0, 0, 500, 235)
            .framed(RegionFrame::rounded(12))
            .capture_events()
            .content(fragment)],
    }
}
