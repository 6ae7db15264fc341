//! Dashboard rendering.
//!
//! Everything here is a pure function of its inputs: the server fetches
//! answers, records the outcome in the session and hands a [`PageView`] to
//! [`render_page`]. Nothing in this module performs I/O.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

use crate::models::{Answer, Span};

/// Id of the dashboard's submit control.
pub const SUBMIT_BUTTON: &str = "ask";

/// Earliest selectable year.
pub const MIN_YEAR: i32 = 1991;

/// Latest selectable year.
pub const MAX_YEAR: i32 = 2022;

/// Clamp both ends into `MIN_YEAR..=MAX_YEAR` and put them in order.
pub fn clamp_year_range(start: i32, end: i32) -> (i32, i32) {
    let start = start.clamp(MIN_YEAR, MAX_YEAR);
    let end = end.clamp(MIN_YEAR, MAX_YEAR);
    (start.min(end), start.max(end))
}

pub const EMPTY_QUESTION_MESSAGE: &str = "please type a question in the searchbar";
pub const NO_ANSWER_MESSAGE: &str = "couldn't find an answer to your question...";
pub const UNKNOWN_CATEGORIES: &str = "Unknown categories";

/// arXiv category codes and their labels.
static CATEGORY_LABELS: &[(&str, &str)] = &[
    ("astro-ph", "Astrophysics"),
    ("astro-ph.CO", "Cosmology and Nongalactic Astrophysics"),
    ("astro-ph.EP", "Earth and Planetary Astrophysics"),
    ("astro-ph.GA", "Astrophysics of Galaxies"),
    ("astro-ph.HE", "High Energy Astrophysical Phenomena"),
    ("astro-ph.IM", "Instrumentation and Methods for Astrophysics"),
    ("astro-ph.SR", "Solar and Stellar Astrophysics"),
    ("cond-mat.dis-nn", "Disordered Systems and Neural Networks"),
    ("cond-mat.mes-hall", "Mesoscale and Nanoscale Physics"),
    ("cond-mat.mtrl-sci", "Materials Science"),
    ("cond-mat.other", "Other Condensed Matter"),
    ("cond-mat.quant-gas", "Quantum Gases"),
    ("cond-mat.soft", "Soft Condensed Matter"),
    ("cond-mat.stat-mech", "Statistical Mechanics"),
    ("cond-mat.str-el", "Strongly Correlated Electrons"),
    ("cond-mat.supr-con", "Superconductivity"),
    ("cs.AI", "Artificial Intelligence"),
    ("cs.AR", "Hardware Architecture"),
    ("cs.CC", "Computational Complexity"),
    ("cs.CE", "Computational Engineering, Finance, and Science"),
    ("cs.CG", "Computational Geometry"),
    ("cs.CL", "Computation and Language"),
    ("cs.CR", "Cryptography and Security"),
    ("cs.CV", "Computer Vision and Pattern Recognition"),
    ("cs.CY", "Computers and Society"),
    ("cs.DB", "Databases"),
    ("cs.DC", "Distributed, Parallel, and Cluster Computing"),
    ("cs.DL", "Digital Libraries"),
    ("cs.DM", "Discrete Mathematics"),
    ("cs.DS", "Data Structures and Algorithms"),
    ("cs.ET", "Emerging Technologies"),
    ("cs.FL", "Formal Languages and Automata Theory"),
    ("cs.GL", "General Literature"),
    ("cs.GR", "Graphics"),
    ("cs.GT", "Computer Science and Game Theory"),
    ("cs.HC", "Human-Computer Interaction"),
    ("cs.IR", "Information Retrieval"),
    ("cs.IT", "Information Theory"),
    ("cs.LG", "Machine Learning"),
    ("cs.LO", "Logic in Computer Science"),
    ("cs.MA", "Multiagent Systems"),
    ("cs.MM", "Multimedia"),
    ("cs.MS", "Mathematical Software"),
    ("cs.NA", "Numerical Analysis"),
    ("cs.NE", "Neural and Evolutionary Computing"),
    ("cs.NI", "Networking and Internet Architecture"),
    ("cs.OH", "Other Computer Science"),
    ("cs.OS", "Operating Systems"),
    ("cs.PF", "Performance"),
    ("cs.PL", "Programming Languages"),
    ("cs.RO", "Robotics"),
    ("cs.SC", "Symbolic Computation"),
    ("cs.SD", "Sound"),
    ("cs.SE", "Software Engineering"),
    ("cs.SI", "Social and Information Networks"),
    ("cs.SY", "Systems and Control"),
    ("econ.EM", "Econometrics"),
    ("eess.AS", "Audio and Speech Processing"),
    ("eess.IV", "Image and Video Processing"),
    ("eess.SP", "Signal Processing"),
    ("gr-qc", "General Relativity and Quantum Cosmology"),
    ("hep-ex", "High Energy Physics - Experiment"),
    ("hep-lat", "High Energy Physics - Lattice"),
    ("hep-ph", "High Energy Physics - Phenomenology"),
    ("hep-th", "High Energy Physics - Theory"),
    ("math-ph", "Mathematical Physics"),
    ("math.AG", "Algebraic Geometry"),
    ("math.AP", "Analysis of PDEs"),
    ("math.CO", "Combinatorics"),
    ("math.DG", "Differential Geometry"),
    ("math.DS", "Dynamical Systems"),
    ("math.FA", "Functional Analysis"),
    ("math.GT", "Geometric Topology"),
    ("math.MP", "Mathematical Physics"),
    ("math.NA", "Numerical Analysis"),
    ("math.NT", "Number Theory"),
    ("math.OC", "Optimization and Control"),
    ("math.PR", "Probability"),
    ("math.ST", "Statistics Theory"),
    ("nlin.CD", "Chaotic Dynamics"),
    ("nlin.PS", "Pattern Formation and Solitons"),
    ("nucl-ex", "Nuclear Experiment"),
    ("nucl-th", "Nuclear Theory"),
    ("physics.bio-ph", "Biological Physics"),
    ("physics.comp-ph", "Computational Physics"),
    ("physics.flu-dyn", "Fluid Dynamics"),
    ("physics.optics", "Optics"),
    ("physics.soc-ph", "Physics and Society"),
    ("q-bio.BM", "Biomolecules"),
    ("q-bio.NC", "Neurons and Cognition"),
    ("q-bio.PE", "Populations and Evolution"),
    ("q-bio.QM", "Quantitative Methods"),
    ("q-fin.CP", "Computational Finance"),
    ("q-fin.ST", "Statistical Finance"),
    ("quant-ph", "Quantum Physics"),
    ("stat.AP", "Statistics - Applications"),
    ("stat.CO", "Statistics - Computation"),
    ("stat.ME", "Statistics - Methodology"),
    ("stat.ML", "Machine Learning"),
    ("stat.TH", "Statistics Theory"),
];

/// Label of a category code, if known.
pub fn category_label(code: &str) -> Option<&'static str> {
    CATEGORY_LABELS
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, label)| *label)
}

/// Sorted, duplicate-free labels for a category string.
///
/// Codes may be separated by commas or whitespace. Unknown codes are kept
/// as-is.
pub fn category_labels(categories: &str) -> Vec<String> {
    categories
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|code| !code.is_empty())
        .map(|code| category_label(code).unwrap_or(code).to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// The category line of a result card.
pub fn categories_line(categories: &str) -> String {
    let labels = category_labels(categories);
    if labels.is_empty() {
        UNKNOWN_CATEGORIES.to_string()
    } else {
        labels.join(", ")
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape `context` and wrap the answer span in `<b>`.
///
/// Offsets count characters and are clamped to the context, so a span past
/// the end highlights nothing rather than panicking.
pub fn highlight_answer(context: &str, span: Span) -> String {
    let len = context.chars().count();
    let start = span.start.min(len);
    let end = span.end.clamp(start, len);

    let before: String = context.chars().take(start).collect();
    let answer: String = context.chars().skip(start).take(end - start).collect();
    let after: String = context.chars().skip(end).collect();

    format!(
        "{}<b class=\"answer\">{}</b>{}",
        escape_html(&before),
        escape_html(&answer),
        escape_html(&after)
    )
}

/// Reader confidence as a percentage with one decimal.
pub fn score_percent(score: f32) -> String {
    format!("{:.1}%", 100.0 * score)
}

/// State of a submit control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SubmitState {
    #[default]
    Idle,
    Submitted,
}

/// Per-session UI state, keyed by component id.
///
/// A control only ever moves from idle to submitted.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    controls: HashMap<String, SubmitState>,
    inputs: FormInputs,
    outcome: Option<Outcome>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a control as idle unless it is already known.
    pub fn register(&mut self, id: &str) {
        self.controls.entry(id.to_string()).or_default();
    }

    /// Mark a control as submitted.
    pub fn submit(&mut self, id: &str) {
        self.controls.insert(id.to_string(), SubmitState::Submitted);
    }

    pub fn state(&self, id: &str) -> SubmitState {
        self.controls.get(id).copied().unwrap_or_default()
    }

    pub fn is_submitted(&self, id: &str) -> bool {
        self.state(id) == SubmitState::Submitted
    }

    pub fn inputs(&self) -> &FormInputs {
        &self.inputs
    }

    pub fn set_inputs(&mut self, inputs: FormInputs) {
        self.inputs = inputs;
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn set_outcome(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
    }
}

/// Values of the dashboard form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormInputs {
    pub question: String,
    pub year_start: i32,
    pub year_end: i32,
    /// Answers to keep; `None` keeps the pipeline's default
    pub top_k: Option<usize>,
}

impl Default for FormInputs {
    fn default() -> Self {
        Self {
            question: String::new(),
            year_start: MIN_YEAR,
            year_end: MAX_YEAR,
            top_k: None,
        }
    }
}

/// Result of the last submission.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Submitted with an empty question; nothing was queried
    EmptyQuestion,
    /// Answers, already sorted by descending score
    Answered { answers: Vec<Answer>, elapsed: Duration },
    /// The pipeline failed
    Failed(String),
}

/// Sidebar status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

/// Status message for an outcome, if any.
pub fn notice(outcome: &Outcome) -> Option<Notice> {
    match outcome {
        Outcome::EmptyQuestion => None,
        Outcome::Answered { answers, elapsed } if !answers.is_empty() => Some(Notice::Success(format!(
            "Top {} answers found in {:.2} seconds!",
            answers.len(),
            elapsed.as_secs_f64()
        ))),
        Outcome::Answered { .. } => Some(Notice::Error(NO_ANSWER_MESSAGE.to_string())),
        Outcome::Failed(reason) => Some(Notice::Error(format!("Search failed: {reason}"))),
    }
}

/// Everything needed to render the dashboard.
#[derive(Debug, Clone, Copy)]
pub struct PageView<'a> {
    pub inputs: &'a FormInputs,
    pub submitted: bool,
    pub outcome: Option<&'a Outcome>,
}

impl<'a> PageView<'a> {
    /// View of a session's current state.
    pub fn from_session(session: &'a SessionState) -> Self {
        Self {
            inputs: session.inputs(),
            submitted: session.is_submitted(SUBMIT_BUTTON),
            outcome: session.outcome(),
        }
    }
}

/// One result card. `rank` starts at 0.
pub fn render_answer_card(rank: usize, answer: &Answer) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<article class=\"card\"><div class=\"main\"><h2><a href=\"https://arxiv.org/abs/{}\">Abstract #{} - {}</a></h2><p>{}</p></div>",
        escape_html(&answer.document_id),
        rank + 1,
        escape_html(&answer.meta.name),
        highlight_answer(&answer.context, answer.offsets_in_document),
    );
    let _ = write!(html, "<aside><p class=\"score\">{}</p>", score_percent(answer.score));
    if !answer.meta.update_date.is_empty() {
        let _ = write!(html, "<p class=\"date\">{}</p>", escape_html(&answer.meta.update_date));
    }
    let _ = write!(
        html,
        "<p class=\"categories\">{}</p></aside></article>",
        escape_html(&categories_line(&answer.meta.categories))
    );
    html
}

fn render_form(inputs: &FormInputs) -> String {
    format!(
        concat!(
            "<form method=\"post\" action=\"/ask\">",
            "<input type=\"text\" name=\"question\" placeholder=\"Ask a question\" value=\"{}\">",
            "<label>From <input type=\"number\" name=\"year_start\" min=\"{min}\" max=\"{max}\" value=\"{}\"></label>",
            "<label>To <input type=\"number\" name=\"year_end\" min=\"{min}\" max=\"{max}\" value=\"{}\"></label>",
            "<label>Answers <input type=\"number\" name=\"top_k\" min=\"1\" value=\"{}\"></label>",
            "<button type=\"submit\" name=\"{button}\">Submit</button>",
            "</form>"
        ),
        escape_html(&inputs.question),
        inputs.year_start,
        inputs.year_end,
        inputs.top_k.map(|k| k.to_string()).unwrap_or_default(),
        min = MIN_YEAR,
        max = MAX_YEAR,
        button = SUBMIT_BUTTON,
    )
}

/// Render the full dashboard page.
pub fn render_page(view: &PageView<'_>) -> String {
    let mut sidebar = render_form(view.inputs);
    let mut main = String::new();

    if view.submitted {
        match view.outcome {
            Some(Outcome::EmptyQuestion) | None => {
                let _ = write!(main, "<div class=\"error\">{}</div>", EMPTY_QUESTION_MESSAGE);
            }
            Some(outcome) => {
                let _ = write!(
                    main,
                    "<h1>You've asked: <em>&laquo; {} &raquo;</em></h1><hr>",
                    escape_html(&view.inputs.question)
                );
                match notice(outcome) {
                    Some(Notice::Success(msg)) => {
                        let _ = write!(sidebar, "<div class=\"success\">{}</div>", escape_html(&msg));
                    }
                    Some(Notice::Error(msg)) => {
                        let _ = write!(sidebar, "<div class=\"error\">{}</div>", escape_html(&msg));
                    }
                    None => {}
                }
                if let Outcome::Answered { answers, .. } = outcome {
                    for (rank, answer) in answers.iter().enumerate() {
                        main.push_str(&render_answer_card(rank, answer));
                        main.push_str("<hr>");
                    }
                }
            }
        }
    }

    format!(
        concat!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Paper QA</title>",
            "<style>{}</style></head><body>",
            "<nav class=\"sidebar\">{}</nav><main>{}</main>",
            "</body></html>"
        ),
        STYLE, sidebar, main
    )
}

const STYLE: &str = "body{display:flex;font-family:sans-serif;background:#1e1e1e;color:#fff;margin:0}\
.sidebar{width:20rem;padding:1rem;background:#2b2b2b}\
main{flex:1;padding:1rem 2rem}\
.card{display:flex;gap:2rem}.card .main{flex:3}.card aside{flex:1}\
a{color:#f71734}b.answer{background:#ffba08;color:#4c4c4c}\
.error{color:#ff6b6b}.success{color:#7bd88f}";
