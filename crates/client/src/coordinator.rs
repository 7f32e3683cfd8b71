use concierge_core::{
    ChatRequest, ErrorKind, History, HistoryLimits, Message, Role, ValidationError, sanitize_text,
};
use snafu::ensure;

use crate::render::markdown_to_html;
use crate::state::{ExchangeId, ExchangeState, ExchangeTransition, TransitionRejection};
use crate::transport::{ChatTransport, EmptyReplySnafu, ExchangeError};

/// One transcript line and its rendered markup, filled at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub message: Message,
    pub markup: Option<String>,
}

impl TranscriptEntry {
    fn new(message: Message) -> Self {
        Self {
            message,
            markup: None,
        }
    }
}

/// Serialized full history for one in-flight exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub id: ExchangeId,
    pub body: ChatRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitRejection {
    Busy { active: ExchangeId },
    Blank,
    TooLong(ValidationError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Committed { reply: String },
    RolledBack { kind: ErrorKind, restored: String },
}

/// Reason `exchange` could not run a full cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeRejection {
    Submit(SubmitRejection),
    Complete(TransitionRejection),
}

impl From<SubmitRejection> for ExchangeRejection {
    fn from(rejection: SubmitRejection) -> Self {
        Self::Submit(rejection)
    }
}

impl From<TransitionRejection> for ExchangeRejection {
    fn from(rejection: TransitionRejection) -> Self {
        Self::Complete(rejection)
    }
}

#[derive(Debug, Clone)]
struct PendingExchange {
    id: ExchangeId,
    typed: String,
}

/// Client-side owner of the conversation.
///
/// The user turn is appended optimistically on submit and either kept (with the
/// reply appended after it) or removed again, so after every cycle the transcript
/// is exactly what the server last accepted.
#[derive(Debug, Clone)]
pub struct ExchangeCoordinator {
    transcript: Vec<TranscriptEntry>,
    input: String,
    state: ExchangeState,
    error: Option<ErrorKind>,
    limits: HistoryLimits,
    next_id: u64,
    pending: Option<PendingExchange>,
    scroll_requested: bool,
}

impl ExchangeCoordinator {
    pub fn new(greeting: Option<&str>, limits: HistoryLimits) -> Self {
        let transcript = greeting
            .map(str::trim)
            .filter(|greeting| !greeting.is_empty())
            .map(|greeting| TranscriptEntry::new(Message::ai(greeting)))
            .into_iter()
            .collect();

        Self {
            transcript,
            input: String::new(),
            state: ExchangeState::Idle,
            error: None,
            limits,
            next_id: 1,
            pending: None,
            scroll_requested: true,
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    /// Failure class of the last rolled-back exchange, cleared by the next submit.
    pub fn error(&self) -> Option<ErrorKind> {
        self.error
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn history(&self) -> History {
        self.transcript
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }

    /// Returns and clears the pending scroll-to-bottom request.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_requested)
    }

    /// Appends the typed input as a user turn and moves to `Sending`.
    ///
    /// Nothing changes when the submit is rejected.
    pub fn submit(&mut self) -> Result<OutboundRequest, SubmitRejection> {
        let id = ExchangeId::new(self.next_id);
        let sending = match self.state.apply(ExchangeTransition::Submit(id)) {
            Ok(state) => state,
            Err(TransitionRejection::AlreadySending { active, .. }) => {
                return Err(SubmitRejection::Busy { active });
            }
            Err(rejection) => {
                tracing::warn!(?rejection, "submit outside idle state");
                return Err(SubmitRejection::Busy { active: id });
            }
        };

        if self.input.trim().is_empty() {
            return Err(SubmitRejection::Blank);
        }
        let text = sanitize_text(self.input.trim());
        if text.trim().is_empty() {
            return Err(SubmitRejection::Blank);
        }

        let mut messages = self.history();
        messages.push(Message::user(text.clone()));
        self.limits
            .check(&messages)
            .map_err(SubmitRejection::TooLong)?;

        self.next_id += 1;
        self.state = sending;
        self.transcript.push(TranscriptEntry::new(Message::user(text)));
        self.pending = Some(PendingExchange {
            id,
            typed: std::mem::take(&mut self.input),
        });
        self.error = None;
        self.scroll_requested = true;
        tracing::debug!(exchange = id.0, turns = messages.len(), "submitted message");

        Ok(OutboundRequest {
            id,
            body: ChatRequest { messages },
        })
    }

    /// Commits the reply or rolls back the optimistic user turn, then settles to `Idle`.
    pub fn complete(
        &mut self,
        id: ExchangeId,
        result: Result<String, ExchangeError>,
    ) -> Result<ExchangeOutcome, TransitionRejection> {
        let result = result.and_then(|reply| {
            let reply = reply.trim();
            ensure!(
                !reply.is_empty(),
                EmptyReplySnafu {
                    stage: "complete-exchange"
                }
            );
            Ok(reply.to_string())
        });

        let outcome = match result {
            Ok(reply) => {
                self.state = self.state.apply(ExchangeTransition::Commit(id))?;
                self.pending = None;
                self.transcript
                    .push(TranscriptEntry::new(Message::ai(reply.clone())));
                self.error = None;
                tracing::debug!(exchange = id.0, "committed reply");
                ExchangeOutcome::Committed { reply }
            }
            Err(error) => {
                self.state = self.state.apply(ExchangeTransition::Rollback(id))?;
                let restored = self
                    .pending
                    .take()
                    .map(|pending| pending.typed)
                    .unwrap_or_default();
                if self
                    .transcript
                    .last()
                    .is_some_and(|entry| entry.message.role == Role::User)
                {
                    self.transcript.pop();
                }
                self.input = restored.clone();
                let kind = error.kind();
                self.error = Some(kind);
                tracing::warn!(exchange = id.0, %kind, error = %error, "rolled back exchange");
                ExchangeOutcome::RolledBack { kind, restored }
            }
        };

        self.scroll_requested = true;
        self.state = self.state.apply(ExchangeTransition::Settle)?;
        Ok(outcome)
    }

    /// Runs one full cycle: submit, send, complete.
    pub async fn exchange<T>(&mut self, transport: &T) -> Result<ExchangeOutcome, ExchangeRejection>
    where
        T: ChatTransport + ?Sized,
    {
        let request = self.submit()?;
        let result = transport.send(&request).await;
        Ok(self.complete(request.id, result)?)
    }

    /// Renders every ai message that has no markup yet, the newest included.
    ///
    /// Returns how many messages were rendered; already rendered ones are skipped.
    pub fn render_latest(&mut self) -> usize {
        let mut rendered = 0;
        for entry in self
            .transcript
            .iter_mut()
            .filter(|entry| entry.message.role == Role::Ai && entry.markup.is_none())
        {
            entry.markup = Some(markdown_to_html(&entry.message.text));
            rendered += 1;
        }
        rendered
    }

    pub fn latest_markup(&self) -> Option<&str> {
        self.transcript
            .iter()
            .rev()
            .find(|entry| entry.message.role == Role::Ai)
            .and_then(|entry| entry.markup.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use concierge_core::DEFAULT_GREETING;
    use futures::future::BoxFuture;

    use super::*;

    /// Replays scripted results and keeps every request it was handed.
    struct ScriptedTransport {
        results: Mutex<Vec<Result<String, ExchangeError>>>,
        seen: Mutex<Vec<History>>,
    }

    impl ScriptedTransport {
        fn new(results: Vec<Result<String, ExchangeError>>) -> Self {
            Self {
                results: Mutex::new(results.into_iter().rev().collect()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ChatTransport for ScriptedTransport {
        fn send<'a>(&'a self, request: &'a OutboundRequest) -> BoxFuture<'a, Result<String, ExchangeError>> {
            Box::pin(async move {
                self.seen.lock().unwrap().push(request.body.messages.clone());
                self.results.lock().unwrap().pop().unwrap()
            })
        }
    }

    fn rejected(status: u16, code: ErrorKind) -> ExchangeError {
        ExchangeError::ServerRejected {
            stage: "test",
            status,
            code: Some(code),
            message: String::new(),
        }
    }

    fn coordinator() -> ExchangeCoordinator {
        ExchangeCoordinator::new(Some(DEFAULT_GREETING), HistoryLimits::default())
    }

    #[test]
    fn submit_appends_user_turn_and_sends_full_history() {
        let mut coordinator = coordinator();
        coordinator.set_input("こんにちは");

        let request = coordinator.submit().unwrap();

        assert_eq!(coordinator.state(), ExchangeState::Sending(request.id));
        assert_eq!(coordinator.input(), "");
        assert_eq!(
            request.body.messages.messages(),
            &[Message::ai(DEFAULT_GREETING), Message::user("こんにちは")]
        );
        assert_eq!(coordinator.history(), request.body.messages);
    }

    #[test]
    fn submit_while_sending_is_rejected_until_idle() {
        let mut coordinator = coordinator();
        coordinator.set_input("first");
        let first = coordinator.submit().unwrap();
        coordinator.set_input("second");

        assert_eq!(
            coordinator.submit(),
            Err(SubmitRejection::Busy { active: first.id })
        );
        assert_eq!(coordinator.history().len(), 2);

        coordinator
            .complete(first.id, Ok("reply".to_string()))
            .unwrap();
        assert!(coordinator.is_idle());
        assert!(coordinator.submit().is_ok());
    }

    #[test]
    fn blank_input_is_ignored() {
        let mut coordinator = coordinator();
        coordinator.set_input("   \n ");

        assert_eq!(coordinator.submit(), Err(SubmitRejection::Blank));
        assert!(coordinator.is_idle());
        assert_eq!(coordinator.history().len(), 1);
    }

    #[test]
    fn markup_is_stripped_from_user_text() {
        let mut coordinator = coordinator();
        coordinator.set_input("<b>help</b><script>alert(1)</script>");

        let request = coordinator.submit().unwrap();

        assert_eq!(request.body.messages.last(), Some(&Message::user("help")));
    }

    #[test]
    fn over_limit_input_is_rejected_locally() {
        let mut coordinator = coordinator();
        coordinator.set_input("a".repeat(5001));

        let rejection = coordinator.submit().unwrap_err();

        assert!(matches!(rejection, SubmitRejection::TooLong(ref error) if error.kind() == ErrorKind::TooLong));
        assert!(coordinator.is_idle());
        assert_eq!(coordinator.input().len(), 5001);
        assert_eq!(coordinator.history().len(), 1);
    }

    fn assert_untouched(coordinator: &ExchangeCoordinator, before: &History, typed: &str) {
        assert!(coordinator.is_idle());
        assert_eq!(&coordinator.history(), before);
        assert_eq!(coordinator.input(), typed);
        assert_eq!(coordinator.error(), None);
    }

    #[test]
    fn history_at_turn_limit_is_rejected_locally() {
        let limits = HistoryLimits {
            max_turns: 3,
            ..HistoryLimits::default()
        };
        let mut coordinator = ExchangeCoordinator::new(Some(DEFAULT_GREETING), limits);
        coordinator.set_input("first");
        let request = coordinator.submit().unwrap();
        coordinator.complete(request.id, Ok("reply".to_string())).unwrap();
        let before = coordinator.history();
        assert_eq!(before.len(), 3);
        coordinator.set_input("one more");

        let rejection = coordinator.submit().unwrap_err();

        assert!(matches!(
            rejection,
            SubmitRejection::TooLong(ValidationError::TooManyTurns { count: 4, limit: 3, .. })
        ));
        assert_untouched(&coordinator, &before, "one more");
    }

    #[test]
    fn oversized_serialized_history_is_rejected_locally() {
        let mut coordinator = coordinator();
        for _ in 0..2 {
            coordinator.set_input("a".repeat(4000));
            let request = coordinator.submit().unwrap();
            coordinator.complete(request.id, Ok("ok".to_string())).unwrap();
        }
        let before = coordinator.history();
        let typed = "b".repeat(4000);
        coordinator.set_input(typed.clone());

        let rejection = coordinator.submit().unwrap_err();

        assert!(matches!(
            rejection,
            SubmitRejection::TooLong(ValidationError::HistoryTooLarge { limit: 10_000, .. })
        ));
        assert_untouched(&coordinator, &before, &typed);
    }

    #[test]
    fn ampersands_count_as_typed_against_message_limit() {
        let mut coordinator = coordinator();
        coordinator.set_input("&".repeat(2000));

        let request = coordinator.submit().unwrap();

        assert_eq!(
            request.body.messages.last(),
            Some(&Message::user("&".repeat(2000)))
        );
    }

    #[test]
    fn rollback_restores_history_and_typed_input() {
        for typed in ["hello", "  spaced out  ", "複数行\nの入力"] {
            let mut coordinator = coordinator();
            let before = coordinator.history();
            coordinator.set_input(typed);
            let request = coordinator.submit().unwrap();

            let outcome = coordinator
                .complete(request.id, Err(rejected(500, ErrorKind::ModelError)))
                .unwrap();

            assert_eq!(
                outcome,
                ExchangeOutcome::RolledBack {
                    kind: ErrorKind::ModelError,
                    restored: typed.to_string(),
                }
            );
            assert_eq!(coordinator.history(), before);
            assert_eq!(coordinator.input(), typed);
            assert_eq!(coordinator.error(), Some(ErrorKind::ModelError));
            assert!(coordinator.is_idle());
        }
    }

    #[test]
    fn empty_reply_counts_as_failure() {
        let mut coordinator = coordinator();
        coordinator.set_input("hello");
        let request = coordinator.submit().unwrap();

        let outcome = coordinator
            .complete(request.id, Ok("  \n".to_string()))
            .unwrap();

        assert!(matches!(
            outcome,
            ExchangeOutcome::RolledBack {
                kind: ErrorKind::NetworkError,
                ..
            }
        ));
        assert_eq!(coordinator.history().len(), 1);
    }

    #[test]
    fn complete_without_active_exchange_is_rejected() {
        let mut coordinator = coordinator();

        assert_eq!(
            coordinator.complete(ExchangeId::new(7), Ok("late".to_string())),
            Err(TransitionRejection::NoActiveExchange)
        );
        assert_eq!(coordinator.history().len(), 1);
    }

    #[test]
    fn next_submit_clears_error_flag() {
        let mut coordinator = coordinator();
        coordinator.set_input("hello");
        let request = coordinator.submit().unwrap();
        coordinator
            .complete(request.id, Err(rejected(400, ErrorKind::TooLong)))
            .unwrap();

        let retry = coordinator.submit().unwrap();

        assert_eq!(coordinator.error(), None);
        assert_ne!(retry.id, request.id);
        assert_eq!(retry.body.messages.last(), Some(&Message::user("hello")));
    }

    #[test]
    fn render_latest_runs_once_per_ai_message() {
        let mut coordinator = coordinator();

        assert_eq!(coordinator.render_latest(), 1);
        assert_eq!(coordinator.render_latest(), 0);

        coordinator.set_input("hi");
        let request = coordinator.submit().unwrap();
        coordinator
            .complete(request.id, Ok("**bold** reply".to_string()))
            .unwrap();

        assert_eq!(coordinator.render_latest(), 1);
        let first = coordinator.latest_markup().unwrap().to_string();
        assert_eq!(coordinator.render_latest(), 0);
        assert_eq!(coordinator.latest_markup(), Some(first.as_str()));
        assert!(first.contains("<strong>bold</strong>"));
    }

    #[test]
    fn render_latest_catches_up_on_skipped_replies() {
        let mut coordinator = coordinator();
        for (input, reply) in [("one", "*first*"), ("two", "*second*")] {
            coordinator.set_input(input);
            let request = coordinator.submit().unwrap();
            coordinator.complete(request.id, Ok(reply.to_string())).unwrap();
        }

        assert_eq!(coordinator.render_latest(), 3);

        let markups = coordinator
            .transcript()
            .iter()
            .filter(|entry| entry.message.role == Role::Ai)
            .map(|entry| entry.markup.as_deref())
            .collect::<Vec<_>>();
        assert!(markups.iter().all(Option::is_some));
        assert!(markups[1].unwrap().contains("<em>first</em>"));
        assert!(markups[2].unwrap().contains("<em>second</em>"));
        assert!(
            coordinator
                .transcript()
                .iter()
                .filter(|entry| entry.message.role == Role::User)
                .all(|entry| entry.markup.is_none())
        );
    }

    #[test]
    fn scroll_is_requested_after_submit_and_complete() {
        let mut coordinator = coordinator();
        assert!(coordinator.take_scroll_request());
        assert!(!coordinator.take_scroll_request());

        coordinator.set_input("hi");
        let request = coordinator.submit().unwrap();
        assert!(coordinator.take_scroll_request());

        coordinator.complete(request.id, Ok("ok".to_string())).unwrap();
        assert!(coordinator.take_scroll_request());
    }

    #[tokio::test]
    async fn greeting_scenario_ends_with_user_and_ai_turns() {
        let transport = ScriptedTransport::new(vec![Ok("どういったご用件でしょうか？".to_string())]);
        let mut coordinator = coordinator();
        coordinator.set_input("こんにちは");

        let outcome = coordinator.exchange(&transport).await.unwrap();

        assert_eq!(
            outcome,
            ExchangeOutcome::Committed {
                reply: "どういったご用件でしょうか？".to_string(),
            }
        );
        let seen = transport.seen.lock().unwrap();
        assert_eq!(
            seen[0].messages(),
            &[Message::ai(DEFAULT_GREETING), Message::user("こんにちは")]
        );
        assert_eq!(
            coordinator.history().messages(),
            &[
                Message::ai(DEFAULT_GREETING),
                Message::user("こんにちは"),
                Message::ai("どういったご用件でしょうか？"),
            ]
        );
    }

    #[tokio::test]
    async fn resubmit_after_rollback_is_a_fresh_cycle() {
        let transport = ScriptedTransport::new(vec![
            Err(rejected(500, ErrorKind::ModelError)),
            Ok("ok".to_string()),
        ]);
        let mut coordinator = coordinator();
        coordinator.set_input("hello");

        let first = coordinator.exchange(&transport).await.unwrap();
        let second = coordinator.exchange(&transport).await.unwrap();

        assert!(matches!(first, ExchangeOutcome::RolledBack { .. }));
        assert_eq!(second, ExchangeOutcome::Committed { reply: "ok".to_string() });
        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0], seen[1]);
        assert_eq!(coordinator.history().len(), 3);
    }
}
