use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use rag::{Phase, Pipeline, QueryKind, QueryOutcome, QueryRejection, Session};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::sync::mpsc;

use crate::ui::draw_ui;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Upload,
    Search,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFocus {
    Context,
    Answer,
}

pub enum Response {
    /// A fresh index is ready and the question is being answered.
    IndexReady,
    Query(QueryOutcome),
}

/// Scroll position of one output pane.
#[derive(Default)]
pub struct ScrollView {
    pub scroll: usize,
    pub content_len: usize,
    pub view_height: usize,
    pub auto_scroll: bool,
}

impl ScrollView {
    fn max_scroll(&self) -> usize {
        self.content_len.saturating_sub(self.view_height)
    }

    pub fn up(&mut self, by: usize) {
        self.scroll = self.scroll.saturating_sub(by);
    }

    pub fn down(&mut self, by: usize) {
        self.scroll = (self.scroll + by).min(self.max_scroll());
    }

    pub fn to_start(&mut self) {
        self.scroll = 0;
    }

    pub fn to_end(&mut self) {
        self.scroll = self.max_scroll();
    }

    /// Called on every draw with the latest text size.
    pub fn fit(&mut self, content_len: usize, view_height: usize) {
        self.content_len = content_len;
        self.view_height = view_height;
        if self.auto_scroll {
            self.scroll = 0;
            self.auto_scroll = false;
        } else if self.scroll > self.max_scroll() {
            self.scroll = self.max_scroll();
        }
    }
}

pub struct App {
    pub input: String,
    /// Cursor position in characters, not bytes.
    pub cursor: usize,
    pub input_mode: InputMode,
    pub output_focus: OutputFocus,
    pub status: String,
    pub context_text: Option<String>,
    pub answer_text: Option<String>,
    pub context_view: ScrollView,
    pub answer_view: ScrollView,
    pub spinner_idx: usize,
    pipeline: Arc<Pipeline>,
    session: Session,
}

impl App {
    pub fn new(pipeline: Arc<Pipeline>, session: Session) -> Self {
        Self {
            input: String::new(),
            cursor: 0,
            input_mode: InputMode::Upload,
            output_focus: OutputFocus::Answer,
            status: "Please upload a PDF file.".to_string(),
            context_text: None,
            answer_text: None,
            context_view: ScrollView::default(),
            answer_view: ScrollView::default(),
            spinner_idx: 0,
            pipeline,
            session,
        }
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn is_loading(&self) -> bool {
        self.session.phase() == Phase::Querying
    }

    pub fn document_name(&self) -> Option<&str> {
        self.session.document().map(|doc| doc.name.as_str())
    }

    pub fn insert_char(&mut self, c: char) {
        let at = byte_offset(&self.input, self.cursor);
        self.input.insert(at, c);
        self.cursor += 1;
    }

    pub fn delete_char(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let at = byte_offset(&self.input, self.cursor);
        self.input.remove(at);
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        if self.cursor < self.input.chars().count() {
            self.cursor += 1;
        }
    }

    fn clear_input(&mut self) {
        self.input.clear();
        self.cursor = 0;
    }

    pub fn toggle_mode(&mut self) {
        self.input_mode = match self.input_mode {
            InputMode::Upload => InputMode::Search,
            InputMode::Search => InputMode::Upload,
        };
        self.clear_input();
    }

    pub fn submit(&mut self, tx: &mpsc::UnboundedSender<Response>) {
        match self.input_mode {
            InputMode::Upload => self.upload(),
            InputMode::Search => self.search(tx),
        }
    }

    fn upload(&mut self) {
        let raw = self.input.trim().to_string();
        if raw.is_empty() {
            self.status = "Type the path of a PDF file and press Enter.".to_string();
            return;
        }
        match self.session.upload(Path::new(&raw)) {
            Ok(doc) => {
                self.status = format!("File uploaded: {}. Enter the search query.", doc.name);
                self.context_text = None;
                self.answer_text = None;
                self.input_mode = InputMode::Search;
                self.clear_input();
            }
            Err(err) => {
                tracing::warn!("upload rejected: {}", err);
                self.status = err.user_message();
            }
        }
    }

    fn search(&mut self, tx: &mpsc::UnboundedSender<Response>) {
        let started = self.session.begin_query(&self.input);
        self.dispatch(started, tx);
    }

    pub fn recommend_fields(&mut self, tx: &mpsc::UnboundedSender<Response>) {
        let started = self.session.begin_recommended_fields();
        self.dispatch(started, tx);
    }

    fn dispatch(
        &mut self,
        started: Result<rag::QueryJob, QueryRejection>,
        tx: &mpsc::UnboundedSender<Response>,
    ) {
        let job = match started {
            Ok(job) => job,
            Err(rejection) => {
                self.status = rejection_message(rejection).to_string();
                return;
            }
        };
        self.status = if job.needs_index() {
            "Creating index...".to_string()
        } else {
            "Processing request...".to_string()
        };
        self.context_text = None;
        self.answer_text = None;
        self.context_view.auto_scroll = true;
        self.answer_view.auto_scroll = true;

        let pipeline = Arc::clone(&self.pipeline);
        let tx = tx.clone();
        tokio::task::spawn_blocking(move || {
            let outcome = job.run_with(&pipeline, || {
                let _ = tx.send(Response::IndexReady);
            });
            let _ = tx.send(Response::Query(outcome));
        });
    }

    pub fn handle_response(&mut self, response: Response) {
        let outcome = match response {
            Response::IndexReady => {
                self.status = "Processing request...".to_string();
                return;
            }
            Response::Query(outcome) => outcome,
        };
        self.session.finish_query(&outcome);
        match outcome.answer {
            Ok(answer) if answer.is_empty() => {
                self.status = "No answer found for your query.".to_string();
                self.context_text = Some(answer.context);
                self.answer_text = None;
            }
            Ok(answer) => {
                self.status = match outcome.kind {
                    QueryKind::Question(_) => "Found results!".to_string(),
                    QueryKind::RecommendedFields => "Processing complete!".to_string(),
                };
                self.context_text = Some(answer.context);
                self.answer_text = Some(answer.text);
            }
            Err(err) => {
                tracing::warn!("request failed: {}", err);
                self.status = err.user_message();
            }
        }
        self.context_view.auto_scroll = true;
        self.answer_view.auto_scroll = true;
    }

    fn focused(&mut self) -> &mut ScrollView {
        match self.output_focus {
            OutputFocus::Context => &mut self.context_view,
            OutputFocus::Answer => &mut self.answer_view,
        }
    }

    pub fn scroll_up(&mut self, by: usize) {
        self.focused().up(by);
    }

    pub fn scroll_down(&mut self, by: usize) {
        self.focused().down(by);
    }

    pub fn page_size(&mut self) -> usize {
        self.focused().view_height.max(1)
    }

    pub fn toggle_focus(&mut self) {
        self.output_focus = match self.output_focus {
            OutputFocus::Context => OutputFocus::Answer,
            OutputFocus::Answer => OutputFocus::Context,
        };
    }

    /// Removes the staged upload; called once the terminal is restored.
    /// Returns whether a request was still running and has been abandoned.
    pub fn shutdown(&mut self) -> rag::Result<bool> {
        let abandoned = self.is_loading();
        self.session.cleanup()?;
        Ok(abandoned)
    }
}

fn rejection_message(rejection: QueryRejection) -> &'static str {
    match rejection {
        QueryRejection::Blank => "Enter the search query.",
        QueryRejection::Busy => "Still working on the previous request...",
        QueryRejection::NoDocument => "Please upload a PDF file.",
        QueryRejection::Unchanged => "The answer for this query is already shown.",
    }
}

pub fn byte_offset(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

pub async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> io::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();
    let mut events = EventStream::new();
    let mut spinner_tick = tokio::time::interval(Duration::from_millis(100));
    spinner_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    draw_ui(terminal, app)?;

    loop {
        tokio::select! {
            _ = spinner_tick.tick() => {
                if app.is_loading() {
                    app.spinner_idx = (app.spinner_idx + 1) % 4;
                    draw_ui(terminal, app)?;
                }
            }
            maybe_result = rx.recv() => {
                if let Some(response) = maybe_result {
                    app.handle_response(response);
                    draw_ui(terminal, app)?;
                }
            }
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
                        match key.code {
                            KeyCode::Char('c') if ctrl => return Ok(()),
                            KeyCode::Char('o') if ctrl => app.toggle_focus(),
                            KeyCode::Esc => return Ok(()),
                            KeyCode::F(3) => app.recommend_fields(&tx),
                            KeyCode::Enter => app.submit(&tx),
                            KeyCode::Tab => app.toggle_mode(),
                            KeyCode::Up => app.scroll_up(1),
                            KeyCode::Down => app.scroll_down(1),
                            KeyCode::PageUp => {
                                let by = app.page_size();
                                app.scroll_up(by);
                            }
                            KeyCode::PageDown => {
                                let by = app.page_size();
                                app.scroll_down(by);
                            }
                            KeyCode::Home => app.focused().to_start(),
                            KeyCode::End => app.focused().to_end(),
                            KeyCode::Left => app.move_left(),
                            KeyCode::Right => app.move_right(),
                            KeyCode::Backspace => app.delete_char(),
                            KeyCode::Char(ch) => app.insert_char(ch),
                            _ => {}
                        }
                        draw_ui(terminal, app)?;
                    }
                    Some(Ok(Event::Resize(_, _))) => draw_ui(terminal, app)?,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => {}
                    None => return Ok(()),
                }
            }
        }
    }
}
