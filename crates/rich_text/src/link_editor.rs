//! The floating link editor as an explicit state machine.
//!
//! [`LinkEditorMachine`] never touches the document. It consumes
//! [`LinkEditorEvent`]s stamped with the current time and answers with
//! [`LinkEditorEffect`]s for its owner to carry out, which keeps the open/close
//! rules testable without an editor or a renderer.

use std::time::{Duration, Instant};

use manos_plate_core::{LinkInfo, ToggleLinkPayload};
use serde::{Deserialize, Serialize};

use crate::debounce::{Debouncer, SuppressionWindow};
use crate::floating::Rect;

/// Selection-change notifications that arrive this soon after the editor
/// opened itself are ignored.
pub const SUPPRESS_AFTER_OPEN: Duration = Duration::from_millis(100);
pub const SELECTION_DEBOUNCE: Duration = Duration::from_millis(100);
/// Input focus is moved once the control has been rendered.
pub const FOCUS_DELAY: Duration = Duration::ZERO;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkMode {
    Create,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum LinkEditorState {
    #[default]
    Closed,
    Open {
        mode: LinkMode,
        url: String,
        anchor: Option<Rect>,
    },
}

impl LinkEditorState {
    pub fn is_open(&self) -> bool {
        matches!(self, LinkEditorState::Open { .. })
    }

    pub fn mode(&self) -> Option<LinkMode> {
        match self {
            LinkEditorState::Open { mode, .. } => Some(*mode),
            LinkEditorState::Closed => None,
        }
    }
}

/// What the selection looked like when a check ran.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSample {
    /// A range selection exists (collapsed or not).
    pub is_range: bool,
    pub is_collapsed: bool,
    pub link: Option<LinkInfo>,
    pub anchor: Option<Rect>,
}

impl SelectionSample {
    fn existing_link(&self) -> Option<&LinkInfo> {
        self.link.as_ref().filter(|link| link.is_existing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEditorKey {
    Enter,
    Escape,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEditorEvent {
    /// The link command arrived without a URL.
    OpenRequested(SelectionSample),
    /// Raw selection-change notification.
    SelectionChanged,
    /// The debounced selection check, answered by the owner.
    SelectionSettled(SelectionSample),
    InputChanged(String),
    Submit,
    Remove,
    Cancel,
    ClickOutside,
    Key(LinkEditorKey),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEditorEffect {
    Dispatch(ToggleLinkPayload),
    /// Inspect the selection and answer with `SelectionSettled`.
    SampleSelection,
    FocusInput,
}

/// Turns what the user typed into a link target. Empty input means "no
/// link". `http`, `https`, `mailto` and `tel` targets are kept as typed; a
/// protocol-relative `//host` gets `https:`; anything else is treated as a
/// bare host and gets `https://`.
pub fn normalize_url(input: &str) -> Option<String> {
    let url = input.trim();
    if url.is_empty() {
        return None;
    }
    let lower = url.to_ascii_lowercase();
    if ["http://", "https://", "mailto:", "tel:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return Some(url.to_string());
    }
    if url.starts_with("//") {
        return Some(format!("https:{url}"));
    }
    Some(format!("https://{url}"))
}

#[derive(Debug, Clone)]
pub struct LinkEditorMachine {
    state: LinkEditorState,
    input: String,
    suppress: SuppressionWindow,
    selection_check: Debouncer,
    focus: Debouncer,
}

impl Default for LinkEditorMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkEditorMachine {
    pub fn new() -> Self {
        Self {
            state: LinkEditorState::Closed,
            input: String::new(),
            suppress: SuppressionWindow::new(SUPPRESS_AFTER_OPEN),
            selection_check: Debouncer::new(SELECTION_DEBOUNCE),
            focus: Debouncer::new(FOCUS_DELAY),
        }
    }

    pub fn state(&self) -> &LinkEditorState {
        &self.state
    }

    /// Current contents of the URL field.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Earliest time `poll` has something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.selection_check.deadline(), self.focus.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn handle(&mut self, event: LinkEditorEvent, now: Instant) -> Vec<LinkEditorEffect> {
        match event {
            LinkEditorEvent::OpenRequested(sample) => {
                if !sample.is_range {
                    tracing::debug!("link editor not opened: no range selection");
                    return Vec::new();
                }
                let (mode, url) = match sample.existing_link() {
                    Some(link) => (LinkMode::Edit, link.url.clone()),
                    None => (LinkMode::Create, String::new()),
                };
                self.suppress.arm(now);
                self.open(mode, url, sample.anchor, now);
                Vec::new()
            }
            LinkEditorEvent::SelectionChanged => {
                if self.suppress.is_active(now) {
                    tracing::trace!("selection change ignored right after opening");
                } else {
                    self.selection_check.schedule(now);
                }
                Vec::new()
            }
            LinkEditorEvent::SelectionSettled(sample) => {
                match sample.existing_link() {
                    Some(link) if sample.is_collapsed => {
                        let url = link.url.clone();
                        let unchanged = matches!(
                            &self.state,
                            LinkEditorState::Open { mode: LinkMode::Edit, url: open, .. } if *open == url
                        );
                        if !unchanged {
                            self.open(LinkMode::Edit, url, sample.anchor, now);
                        }
                    }
                    _ => self.close(),
                }
                Vec::new()
            }
            LinkEditorEvent::InputChanged(text) => {
                if self.state.is_open() {
                    self.input = text;
                }
                Vec::new()
            }
            LinkEditorEvent::Submit | LinkEditorEvent::Key(LinkEditorKey::Enter) => self.submit(),
            LinkEditorEvent::Remove => match self.state.mode() {
                Some(LinkMode::Edit) => {
                    self.close();
                    vec![LinkEditorEffect::Dispatch(ToggleLinkPayload::Remove)]
                }
                Some(LinkMode::Create) => {
                    tracing::warn!("remove ignored: the link editor is creating a link");
                    Vec::new()
                }
                None => Vec::new(),
            },
            LinkEditorEvent::Cancel
            | LinkEditorEvent::ClickOutside
            | LinkEditorEvent::Key(LinkEditorKey::Escape) => {
                self.close();
                Vec::new()
            }
        }
    }

    /// Fires whatever timers are due.
    pub fn poll(&mut self, now: Instant) -> Vec<LinkEditorEffect> {
        let mut effects = Vec::new();
        if self.focus.take_due(now) && self.state.is_open() {
            effects.push(LinkEditorEffect::FocusInput);
        }
        if self.selection_check.take_due(now) {
            effects.push(LinkEditorEffect::SampleSelection);
        }
        effects
    }

    fn open(&mut self, mode: LinkMode, url: String, anchor: Option<Rect>, now: Instant) {
        tracing::debug!(?mode, %url, "link editor open");
        self.input = url.clone();
        self.state = LinkEditorState::Open { mode, url, anchor };
        self.focus.schedule(now);
    }

    fn close(&mut self) {
        if self.state.is_open() {
            tracing::debug!("link editor closed");
        }
        self.state = LinkEditorState::Closed;
        self.input.clear();
        self.focus.cancel();
    }

    fn submit(&mut self) -> Vec<LinkEditorEffect> {
        let Some(mode) = self.state.mode() else {
            return Vec::new();
        };
        let effect = match (normalize_url(&self.input), mode) {
            (Some(url), _) => Some(ToggleLinkPayload::Apply(url)),
            (None, LinkMode::Edit) => Some(ToggleLinkPayload::Remove),
            (None, LinkMode::Create) => None,
        };
        self.close();
        effect.map(LinkEditorEffect::Dispatch).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(collapsed: bool, url: Option<&str>) -> SelectionSample {
        SelectionSample {
            is_range: true,
            is_collapsed: collapsed,
            link: Some(LinkInfo {
                url: url.unwrap_or_default().to_string(),
                is_existing: url.is_some(),
            }),
            anchor: None,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn normalize_adds_a_secure_scheme_only_when_missing() {
        assert_eq!(normalize_url("  example.com "), Some("https://example.com".into()));
        assert_eq!(normalize_url("http://a.example"), Some("http://a.example".into()));
        assert_eq!(normalize_url("HTTPS://A.example"), Some("HTTPS://A.example".into()));
        assert_eq!(normalize_url("mailto:x@y.z"), Some("mailto:x@y.z".into()));
        assert_eq!(normalize_url("tel:+100"), Some("tel:+100".into()));
        assert_eq!(normalize_url("//cdn.example/x"), Some("https://cdn.example/x".into()));
        assert_eq!(normalize_url("   "), None);
    }

    #[test]
    fn open_request_without_a_range_stays_closed() {
        let mut machine = LinkEditorMachine::new();
        let sample = SelectionSample {
            is_range: false,
            is_collapsed: false,
            link: None,
            anchor: None,
        };
        machine.handle(LinkEditorEvent::OpenRequested(sample), Instant::now());
        assert_eq!(machine.state(), &LinkEditorState::Closed);
    }

    #[test]
    fn create_flow_submits_the_normalized_url() {
        let now = Instant::now();
        let mut machine = LinkEditorMachine::new();
        machine.handle(LinkEditorEvent::OpenRequested(sample(false, None)), now);
        assert_eq!(machine.state().mode(), Some(LinkMode::Create));
        assert_eq!(machine.poll(now), [LinkEditorEffect::FocusInput]);

        machine.handle(LinkEditorEvent::InputChanged("example.com".into()), now);
        let effects = machine.handle(LinkEditorEvent::Key(LinkEditorKey::Enter), now);
        assert_eq!(effects, [LinkEditorEffect::Dispatch(ToggleLinkPayload::Apply(
            "https://example.com".into()
        ))]);
        assert_eq!(machine.state(), &LinkEditorState::Closed);
        assert_eq!(machine.input(), "");
    }

    #[test]
    fn empty_submit_removes_only_in_edit_mode() {
        let now = Instant::now();
        let mut machine = LinkEditorMachine::new();
        machine.handle(LinkEditorEvent::OpenRequested(sample(false, None)), now);
        machine.handle(LinkEditorEvent::InputChanged("  ".into()), now);
        assert!(machine.handle(LinkEditorEvent::Submit, now).is_empty());
        assert!(!machine.state().is_open());

        machine.handle(LinkEditorEvent::OpenRequested(sample(true, Some("https://a"))), now);
        assert_eq!(machine.input(), "https://a");
        machine.handle(LinkEditorEvent::InputChanged(String::new()), now);
        assert_eq!(machine.handle(LinkEditorEvent::Submit, now), [
            LinkEditorEffect::Dispatch(ToggleLinkPayload::Remove)
        ]);
    }

    #[test]
    fn remove_is_only_offered_while_editing() {
        let now = Instant::now();
        let mut machine = LinkEditorMachine::new();
        machine.handle(LinkEditorEvent::OpenRequested(sample(false, None)), now);
        assert!(machine.handle(LinkEditorEvent::Remove, now).is_empty());
        assert!(machine.state().is_open());

        machine.handle(LinkEditorEvent::OpenRequested(sample(false, Some("https://a"))), now);
        assert_eq!(machine.handle(LinkEditorEvent::Remove, now), [
            LinkEditorEffect::Dispatch(ToggleLinkPayload::Remove)
        ]);
        assert!(!machine.state().is_open());
    }

    #[test]
    fn selection_changes_right_after_opening_are_ignored() {
        let now = Instant::now();
        let mut machine = LinkEditorMachine::new();
        machine.handle(LinkEditorEvent::OpenRequested(sample(false, None)), now);
        machine.handle(LinkEditorEvent::SelectionChanged, now + ms(20));
        assert_eq!(machine.poll(now + ms(500)), [LinkEditorEffect::FocusInput]);
        assert!(machine.state().is_open());

        // Once the window has passed, changes are checked again.
        machine.handle(LinkEditorEvent::SelectionChanged, now + ms(150));
        assert!(machine.poll(now + ms(200)).is_empty());
        assert_eq!(machine.poll(now + ms(250)), [LinkEditorEffect::SampleSelection]);
        machine.handle(LinkEditorEvent::SelectionSettled(sample(false, None)), now + ms(250));
        assert!(!machine.state().is_open());
    }

    #[test]
    fn settled_caret_inside_a_link_opens_for_editing() {
        let now = Instant::now();
        let mut machine = LinkEditorMachine::new();
        machine.handle(LinkEditorEvent::SelectionChanged, now);
        machine.handle(LinkEditorEvent::SelectionChanged, now + ms(50));
        assert!(machine.poll(now + ms(100)).is_empty());
        assert_eq!(machine.poll(now + ms(150)), [LinkEditorEffect::SampleSelection]);

        machine.handle(
            LinkEditorEvent::SelectionSettled(sample(true, Some("https://a.example"))),
            now + ms(150),
        );
        assert_eq!(machine.state(), &LinkEditorState::Open {
            mode: LinkMode::Edit,
            url: "https://a.example".into(),
            anchor: None,
        });

        // A range over a link does not open it.
        machine.handle(
            LinkEditorEvent::SelectionSettled(sample(false, Some("https://a.example"))),
            now + ms(300),
        );
        assert_eq!(machine.state(), &LinkEditorState::Closed);
    }

    #[test]
    fn re_settling_on_the_same_link_keeps_typed_input() {
        let now = Instant::now();
        let mut machine = LinkEditorMachine::new();
        let on_link = sample(true, Some("https://a"));
        machine.handle(LinkEditorEvent::SelectionSettled(on_link.clone()), now);
        machine.handle(LinkEditorEvent::InputChanged("https://b".into()), now);
        machine.handle(LinkEditorEvent::SelectionSettled(on_link), now);
        assert_eq!(machine.input(), "https://b");
    }

    #[test]
    fn cancel_and_click_outside_close_without_effects() {
        let now = Instant::now();
        for event in [
            LinkEditorEvent::Cancel,
            LinkEditorEvent::ClickOutside,
            LinkEditorEvent::Key(LinkEditorKey::Escape),
        ] {
            let mut machine = LinkEditorMachine::new();
            machine.handle(LinkEditorEvent::OpenRequested(sample(false, Some("https://a"))), now);
            assert!(machine.handle(event, now).is_empty());
            assert!(!machine.state().is_open());
            // Focus never lands on a closed control.
            assert!(machine.poll(now).is_empty());
        }
    }
}
