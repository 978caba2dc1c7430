//! Guards against leaving a live chat session by accident.
//!
//! The host (browser shell, TUI, native window) forwards its navigation
//! signals as [`NavigationEvent`]s to a [`NavigationGuard`]. The guard decides
//! whether each one proceeds, asking the user through the host's
//! [`Navigator`] where needed, and runs the leave sequence when the user
//! confirms they want out.
//!
//! A session is *guarded* while one exists and the state is neither
//! [`Kicked`](crate::state::ConnectionState::Kicked) nor
//! [`Error`](crate::state::ConnectionState::Error).
//! Once terminal, every signal passes through untouched.

use tracing::{debug, info};

use crate::client::ChatClient;
use crate::error::Result;

/// Prompt shown before closing or navigating away from a live session.
pub const LEAVE_PROMPT: &str = "Are you sure you want to leave the chat room?";

/// Prompt shown before a reload of a live session.
pub const REFRESH_PROMPT: &str = "Are you sure you want to refresh? You will leave the chat room.";

/// Host capabilities the guard needs.
pub trait Navigator: Send + Sync {
    /// Ask the user a yes/no question. `true` means proceed.
    fn confirm(&self, prompt: &str) -> bool;

    /// Push the current location back onto the history stack, so a back
    /// gesture lands on the chat view again.
    fn trap_history(&self);

    /// Leave the chat view for the room/username entry point.
    fn navigate_to_entry(&self);
}

/// A navigation signal raised by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationEvent {
    /// The window or tab is about to close.
    Unload,
    /// History back gesture or button.
    Back,
    /// Reload key (F5, Ctrl+R, Cmd+R).
    ReloadKey,
    /// History keyboard shortcut (Alt+Left, Alt+Right).
    HistoryKey,
    /// Foreground visibility changed.
    VisibilityChanged { visible: bool },
}

/// What the host should do with the signal that was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Let the default behavior proceed.
    Allow,
    /// Suppress the default behavior.
    Block,
    /// The leave sequence ran and the guard already navigated to the entry.
    Left,
}

/// Mediates host navigation signals for one chat session.
pub struct NavigationGuard<N: Navigator> {
    navigator: N,
}

impl<N: Navigator> NavigationGuard<N> {
    pub fn new(navigator: N) -> Self {
        Self { navigator }
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// Arm the back trap once the chat view is shown.
    pub fn install(&self) {
        self.navigator.trap_history();
    }

    /// Whether navigation away from `client` needs the user's confirmation.
    pub async fn is_guarding(client: &ChatClient) -> bool {
        client.is_running()
            && client.session().await.is_some()
            && !client.state().await.is_terminal()
    }

    /// Decide on one navigation signal.
    ///
    /// # Errors
    ///
    /// Propagates errors from the leave sequence.
    pub async fn handle(
        &self,
        client: &mut ChatClient,
        event: NavigationEvent,
    ) -> Result<NavigationDecision> {
        let state = client.state().await;
        if state.is_terminal() {
            debug!(?event, %state, "session ended, not guarding");
            return Ok(NavigationDecision::Allow);
        }
        let guarding = Self::is_guarding(client).await;

        match event {
            NavigationEvent::Unload => {
                if !guarding {
                    return Ok(NavigationDecision::Allow);
                }
                if self.navigator.confirm(LEAVE_PROMPT) {
                    client.leave().await?;
                    Ok(NavigationDecision::Allow)
                } else {
                    Ok(NavigationDecision::Block)
                }
            }
            NavigationEvent::Back => {
                if guarding && client.is_connected() {
                    self.navigator.trap_history();
                    if self.navigator.confirm(LEAVE_PROMPT) {
                        self.leave(client).await?;
                        Ok(NavigationDecision::Left)
                    } else {
                        debug!("back navigation declined");
                        Ok(NavigationDecision::Block)
                    }
                } else {
                    // Nothing to confirm, but a live task must not outlive the view.
                    self.leave(client).await?;
                    Ok(NavigationDecision::Left)
                }
            }
            NavigationEvent::ReloadKey => {
                if !guarding {
                    return Ok(NavigationDecision::Allow);
                }
                if self.navigator.confirm(REFRESH_PROMPT) {
                    client.leave().await?;
                    Ok(NavigationDecision::Allow)
                } else {
                    Ok(NavigationDecision::Block)
                }
            }
            NavigationEvent::HistoryKey => Ok(NavigationDecision::Block),
            NavigationEvent::VisibilityChanged { visible } => {
                if visible && client.is_established() {
                    client.announce_visible()?;
                }
                Ok(NavigationDecision::Allow)
            }
        }
    }

    /// Leave the room and return to the entry point.
    ///
    /// Runs the client's leave sequence, waits the configured grace period so
    /// `leaveRoom` can flush, then navigates.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`ChatClient::leave`] other than the session
    /// task having already exited.
    pub async fn leave(&self, client: &mut ChatClient) -> Result<()> {
        if client.is_running() {
            client.leave().await?;
        }
        tokio::time::sleep(client.leave_grace()).await;
        info!(identity = %client.identity(), "navigating to entry point");
        self.navigator.navigate_to_entry();
        Ok(())
    }
}

impl<N: Navigator + std::fmt::Debug> std::fmt::Debug for NavigationGuard<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationGuard")
            .field("navigator", &self.navigator)
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::config::{ChatConfig, TransportKind};
    use crate::error::ChatError;
    use crate::event::ChatEvent;
    use crate::identity::ChatIdentity;
    use crate::protocol::{ClientMessage, ServerMessage};
    use crate::state::ConnectionState;
    use crate::transport::{Connector, Transport};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;
    use tokio::sync::mpsc;

    // ── Mock navigator ──────────────────────────────────────────────

    #[derive(Debug, Default)]
    struct MockNavigator {
        answer: AtomicBool,
        prompts: StdMutex<Vec<String>>,
        traps: AtomicUsize,
        entries: AtomicUsize,
    }

    impl MockNavigator {
        fn answering(answer: bool) -> Self {
            Self {
                answer: AtomicBool::new(answer),
                ..Self::default()
            }
        }
    }

    impl Navigator for MockNavigator {
        fn confirm(&self, prompt: &str) -> bool {
            self.prompts.lock().unwrap().push(prompt.to_owned());
            self.answer.load(Ordering::SeqCst)
        }

        fn trap_history(&self) {
            self.traps.fetch_add(1, Ordering::SeqCst);
        }

        fn navigate_to_entry(&self) {
            self.entries.fetch_add(1, Ordering::SeqCst);
        }
    }

    // ── Mock session ────────────────────────────────────────────────

    struct ScriptedTransport {
        incoming: VecDeque<String>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), ChatError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, ChatError>> {
            match self.incoming.pop_front() {
                Some(frame) => Some(Ok(frame)),
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), ChatError> {
            Ok(())
        }
    }

    struct ScriptedConnector {
        frames: Vec<String>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Transport = ScriptedTransport;

        async fn connect(
            &self,
            _url: &str,
            _preference: &[TransportKind],
        ) -> std::result::Result<ScriptedTransport, ChatError> {
            Ok(ScriptedTransport {
                incoming: self.frames.iter().cloned().collect(),
                sent: Arc::clone(&self.sent),
            })
        }
    }

    fn json(msg: &ServerMessage) -> String {
        serde_json::to_string(msg).unwrap()
    }

    fn established_frames() -> Vec<String> {
        vec![
            json(&ServerMessage::UsernameValidation {
                valid: true,
                error: None,
            }),
            json(&ServerMessage::SessionEstablished {
                session_id: "sess-1".into(),
                username: "alice".into(),
                room_id: "9".into(),
            }),
        ]
    }

    async fn open_until(
        frames: Vec<String>,
        done: fn(&ChatEvent) -> bool,
    ) -> (ChatClient, mpsc::Receiver<ChatEvent>, Arc<StdMutex<Vec<String>>>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let connector = ScriptedConnector {
            frames,
            sent: Arc::clone(&sent),
        };
        let config = ChatConfig::new("ws://chat.test").with_leave_grace(Duration::from_millis(1));
        let identity = ChatIdentity::new("alice", "9").unwrap();
        let (client, mut events) = ChatClient::open(connector, config, identity).unwrap();
        loop {
            let event = events.recv().await.unwrap();
            if done(&event) {
                break;
            }
        }
        (client, events, sent)
    }

    async fn established() -> (ChatClient, mpsc::Receiver<ChatEvent>, Arc<StdMutex<Vec<String>>>) {
        open_until(established_frames(), |e| {
            matches!(e, ChatEvent::SessionEstablished(_))
        })
        .await
    }

    fn last_sent(sent: &Arc<StdMutex<Vec<String>>>) -> ClientMessage {
        serde_json::from_str(sent.lock().unwrap().last().unwrap()).unwrap()
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn install_traps_history_once() {
        let guard = NavigationGuard::new(MockNavigator::default());
        guard.install();
        assert_eq!(guard.navigator().traps.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unload_prompts_while_guarding() {
        let (mut client, _events, _sent) = established().await;
        let guard = NavigationGuard::new(MockNavigator::answering(false));

        let decision = guard
            .handle(&mut client, NavigationEvent::Unload)
            .await
            .unwrap();
        assert_eq!(decision, NavigationDecision::Block);
        assert_eq!(
            guard.navigator().prompts.lock().unwrap().as_slice(),
            [LEAVE_PROMPT]
        );
        assert!(client.is_established());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn back_declined_re_traps_history_once() {
        let (mut client, _events, _sent) = established().await;
        let guard = NavigationGuard::new(MockNavigator::answering(false));

        let decision = guard
            .handle(&mut client, NavigationEvent::Back)
            .await
            .unwrap();
        assert_eq!(decision, NavigationDecision::Block);
        assert_eq!(guard.navigator().traps.load(Ordering::SeqCst), 1);
        assert_eq!(guard.navigator().entries.load(Ordering::SeqCst), 0);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn back_confirmed_leaves_and_navigates() {
        let (mut client, _events, sent) = established().await;
        let guard = NavigationGuard::new(MockNavigator::answering(true));

        let decision = guard
            .handle(&mut client, NavigationEvent::Back)
            .await
            .unwrap();
        assert_eq!(decision, NavigationDecision::Left);
        assert!(matches!(last_sent(&sent), ClientMessage::LeaveRoom { .. }));
        assert_eq!(guard.navigator().entries.load(Ordering::SeqCst), 1);
        assert!(!client.is_running());
    }

    #[tokio::test]
    async fn back_without_session_leaves_without_prompting() {
        let (mut client, _events, sent) = open_until(vec![], |e| {
            matches!(e, ChatEvent::StateChanged(ConnectionState::Validating))
        })
        .await;
        let guard = NavigationGuard::new(MockNavigator::answering(false));

        let decision = guard
            .handle(&mut client, NavigationEvent::Back)
            .await
            .unwrap();
        assert_eq!(decision, NavigationDecision::Left);
        assert!(guard.navigator().prompts.lock().unwrap().is_empty());
        assert_eq!(guard.navigator().entries.load(Ordering::SeqCst), 1);
        assert!(!client.is_running());
        assert!(matches!(last_sent(&sent), ClientMessage::LeaveRoom { .. }));
    }

    #[tokio::test]
    async fn reload_key_uses_refresh_prompt() {
        let (mut client, _events, _sent) = established().await;
        let guard = NavigationGuard::new(MockNavigator::answering(false));

        let decision = guard
            .handle(&mut client, NavigationEvent::ReloadKey)
            .await
            .unwrap();
        assert_eq!(decision, NavigationDecision::Block);
        assert_eq!(
            guard.navigator().prompts.lock().unwrap().as_slice(),
            [REFRESH_PROMPT]
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn history_keys_are_blocked() {
        let (mut client, _events, _sent) = established().await;
        let guard = NavigationGuard::new(MockNavigator::answering(true));

        let decision = guard
            .handle(&mut client, NavigationEvent::HistoryKey)
            .await
            .unwrap();
        assert_eq!(decision, NavigationDecision::Block);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn becoming_visible_sends_one_heartbeat() {
        let (mut client, _events, sent) = established().await;
        let guard = NavigationGuard::new(MockNavigator::default());

        let before = sent.lock().unwrap().len();
        let decision = guard
            .handle(&mut client, NavigationEvent::VisibilityChanged { visible: true })
            .await
            .unwrap();
        assert_eq!(decision, NavigationDecision::Allow);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(sent.lock().unwrap().len(), before + 1);
        assert!(matches!(last_sent(&sent), ClientMessage::Heartbeat { .. }));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn kicked_session_passes_everything_through() {
        let mut frames = established_frames();
        frames.push(json(&ServerMessage::SessionKicked {
            reason: "duplicate login".into(),
            timestamp: 1,
        }));
        let (mut client, _events, _sent) =
            open_until(frames, |e| matches!(e, ChatEvent::Failed(_))).await;
        let guard = NavigationGuard::new(MockNavigator::answering(false));

        for event in [
            NavigationEvent::Unload,
            NavigationEvent::Back,
            NavigationEvent::ReloadKey,
            NavigationEvent::HistoryKey,
        ] {
            let decision = guard.handle(&mut client, event).await.unwrap();
            assert_eq!(decision, NavigationDecision::Allow, "{event:?}");
        }
        assert!(guard.navigator().prompts.lock().unwrap().is_empty());
        assert_eq!(guard.navigator().traps.load(Ordering::SeqCst), 0);

        client.shutdown().await;
    }
}
