//! CommandRouter: turns inbound control messages into synthetic key events.
//!
//! This use case sits at the application layer.  It decodes the raw text the
//! client sent, resolves the button through the [`KeyMap`], and delegates the
//! actual OS call to an [`InputInjector`] trait object.  The platform-specific
//! injectors live in the infrastructure layer.
//!
//! Every failure here is per-command: the caller gets a
//! [`CommandResponse`] with `success = false` and the session carries on.
//!
//! # Held keys
//!
//! The router remembers which key codes it pressed and has not yet released.
//! When the owning session ends, [`CommandRouter::release_all`] lifts them so
//! a client that vanished mid-press does not leave a key stuck down on the
//! host.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use pokeremote_core::{
    decode_command, decode_command_bytes, ButtonCommand, ButtonId, ButtonIntent,
    CommandResponse, KeyCode, KeyMap, ProtocolError,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Error type for a single synthetic key event.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InjectionError {
    /// The OS rejected or dropped the event.
    #[error("platform error: {0}")]
    Platform(String),
    /// The key code cannot be expressed on this platform.
    #[error("unsupported key code: {0}")]
    UnsupportedKey(KeyCode),
}

/// Synthesises OS-level key events.
///
/// Implementations must be callable from any thread.  Both methods are
/// idempotent from the router's point of view: pressing a key that is
/// already down, or releasing one that is already up, is harmless.
#[cfg_attr(test, mockall::automock)]
pub trait InputInjector: Send + Sync {
    /// Emits a key-down event for `code`.
    fn send_down(&self, code: KeyCode) -> Result<(), InjectionError>;

    /// Emits a key-up event for `code`.
    fn send_up(&self, code: KeyCode) -> Result<(), InjectionError>;
}

/// Why a command was not executed.
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    /// The message could not be decoded into a command.
    #[error("malformed command: {0}")]
    Malformed(#[from] ProtocolError),

    /// The key map has no entry for the requested button.
    #[error("Unknown button: {0}")]
    UnknownButton(String),

    /// The OS call failed.
    #[error("injection failed for {button}: {source}")]
    Injection {
        button: ButtonId,
        #[source]
        source: InjectionError,
    },
}

impl CommandError {
    /// The response the client sees for this failure.
    pub fn to_response(&self) -> CommandResponse {
        match self {
            CommandError::Malformed(e) => CommandResponse::rejected(format!("Invalid command: {e}")),
            CommandError::UnknownButton(_) => CommandResponse::rejected(self.to_string()),
            CommandError::Injection { .. } => {
                CommandResponse::rejected("Failed to execute command")
            }
        }
    }
}

/// Outcome of dispatching one raw message: the button acted on, or why not.
pub type DispatchResult = Result<ButtonId, CommandError>;

/// Routes decoded button commands to an [`InputInjector`].
pub struct CommandRouter {
    keymap: KeyMap,
    injector: Arc<dyn InputInjector>,
    held: Mutex<BTreeSet<KeyCode>>,
}

impl CommandRouter {
    /// Creates a router over `keymap` that injects through `injector`.
    pub fn new(keymap: KeyMap, injector: Arc<dyn InputInjector>) -> Self {
        Self {
            keymap,
            injector,
            held: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    /// Decodes and executes one control message given as text.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] for malformed input, unknown buttons, or an
    /// OS injection failure.  None of these affect later commands.
    pub fn dispatch(&self, raw: &str) -> DispatchResult {
        let cmd = decode_command(raw)?;
        self.execute(&cmd)
    }

    /// Same as [`CommandRouter::dispatch`] for a binary data-channel frame.
    ///
    /// # Errors
    ///
    /// See [`CommandRouter::dispatch`].
    pub fn dispatch_bytes(&self, raw: &[u8]) -> DispatchResult {
        let cmd = decode_command_bytes(raw)?;
        self.execute(&cmd)
    }

    /// Dispatches `raw` and folds the outcome into a client-facing response.
    pub fn respond(&self, raw: &str) -> CommandResponse {
        match self.dispatch(raw) {
            Ok(button) => {
                debug!(%button, "command executed");
                CommandResponse::ok()
            }
            Err(e) => {
                warn!(error = %e, "command rejected");
                e.to_response()
            }
        }
    }

    /// Executes an already-decoded command.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::UnknownButton`] if the key map has no entry for
    /// the button, or [`CommandError::Injection`] if the OS call fails.
    pub fn execute(&self, cmd: &ButtonCommand) -> DispatchResult {
        let (button, code) = self
            .keymap
            .lookup(&cmd.button_id)
            .ok_or_else(|| CommandError::UnknownButton(cmd.button_id.clone()))?;

        let result = match cmd.intent {
            ButtonIntent::Pressed => self.press(code),
            ButtonIntent::Released => self.release(code),
            ButtonIntent::Tapped => self.press(code).and_then(|()| self.release(code)),
        };

        result
            .map(|()| button)
            .map_err(|source| CommandError::Injection { button, source })
    }

    /// Key codes pressed through this router and not yet released.
    pub fn held_keys(&self) -> Vec<KeyCode> {
        self.held.lock().iter().copied().collect()
    }

    /// Releases every held key.  Returns how many releases succeeded.
    ///
    /// Failures are logged and the key is forgotten either way; there is
    /// nothing more the router can do for it.
    pub fn release_all(&self) -> usize {
        let held: Vec<KeyCode> = std::mem::take(&mut *self.held.lock()).into_iter().collect();
        let mut released = 0;
        for code in held {
            match self.injector.send_up(code) {
                Ok(()) => released += 1,
                Err(e) => warn!(%code, error = %e, "failed to release held key"),
            }
        }
        released
    }

    fn press(&self, code: KeyCode) -> Result<(), InjectionError> {
        self.injector.send_down(code)?;
        self.held.lock().insert(code);
        Ok(())
    }

    fn release(&self, code: KeyCode) -> Result<(), InjectionError> {
        self.injector.send_up(code)?;
        self.held.lock().remove(&code);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use pokeremote_core::KeyPlatform;

    const VK_Z: KeyCode = KeyCode(0x5A);
    const VK_RETURN: KeyCode = KeyCode(0x0D);

    fn router(mock: MockInputInjector) -> CommandRouter {
        CommandRouter::new(KeyMap::standard(KeyPlatform::WindowsVk), Arc::new(mock))
    }

    #[test]
    fn test_keydown_a_calls_send_down_once_with_mapped_code() {
        // Arrange
        let mut mock = MockInputInjector::new();
        mock.expect_send_down()
            .with(eq(VK_Z))
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_send_up().never();
        let router = router(mock);

        // Act
        let result = router.dispatch(r#"{"type":"keydown","key":"A"}"#);

        // Assert
        assert_eq!(result, Ok(ButtonId::A));
    }

    #[test]
    fn test_unknown_button_calls_no_injector_method() {
        // Arrange
        let mut mock = MockInputInjector::new();
        mock.expect_send_down().never();
        mock.expect_send_up().never();
        let router = router(mock);

        // Act
        let result = router.dispatch(r#"{"type":"keydown","key":"Q"}"#);

        // Assert
        assert_eq!(result, Err(CommandError::UnknownButton("Q".to_string())));
    }

    #[test]
    fn test_lowercase_key_is_accepted() {
        let mut mock = MockInputInjector::new();
        mock.expect_send_down()
            .with(eq(VK_Z))
            .times(1)
            .returning(|_| Ok(()));
        let router = router(mock);

        assert!(router.respond(r#"{"type":"keydown","key":"a"}"#).success);
    }

    #[test]
    fn test_keyup_calls_send_up() {
        let mut mock = MockInputInjector::new();
        mock.expect_send_up()
            .with(eq(VK_RETURN))
            .times(1)
            .returning(|_| Ok(()));
        let router = router(mock);

        assert_eq!(
            router.dispatch(r#"{"type":"keyup","key":"start"}"#),
            Ok(ButtonId::Start)
        );
    }

    #[test]
    fn test_keypress_sends_down_then_up() {
        // Arrange
        let mut seq = Sequence::new();
        let mut mock = MockInputInjector::new();
        mock.expect_send_down()
            .with(eq(VK_Z))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_send_up()
            .with(eq(VK_Z))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let router = router(mock);

        // Act
        let result = router.dispatch(r#"{"type":"keypress","key":"A"}"#);

        // Assert
        assert_eq!(result, Ok(ButtonId::A));
        assert!(router.held_keys().is_empty());
    }

    #[test]
    fn test_malformed_message_is_rejected_without_injection() {
        let mut mock = MockInputInjector::new();
        mock.expect_send_down().never();
        let router = router(mock);

        let response = router.respond(r#"{"type":"keydown"}"#);

        assert!(!response.success);
        assert!(response.message.starts_with("Invalid command"));
    }

    #[test]
    fn test_injection_failure_is_reported_per_command() {
        let mut mock = MockInputInjector::new();
        mock.expect_send_down()
            .returning(|_| Err(InjectionError::Platform("SendInput failed".into())));
        let router = router(mock);

        let response = router.respond(r#"{"type":"keydown","key":"B"}"#);

        assert_eq!(response, CommandResponse::rejected("Failed to execute command"));
        assert!(router.held_keys().is_empty());
    }

    #[test]
    fn test_unknown_button_response_names_the_button() {
        let router = router(MockInputInjector::new());

        let response = router.respond(r#"{"type":"keyup","key":"turbo"}"#);

        assert_eq!(response.message, "Unknown button: turbo");
    }

    #[test]
    fn test_release_all_lifts_every_held_key() {
        // Arrange
        let mut mock = MockInputInjector::new();
        mock.expect_send_down().times(2).returning(|_| Ok(()));
        mock.expect_send_up().times(2).returning(|_| Ok(()));
        let router = router(mock);
        router.dispatch(r#"{"type":"keydown","key":"A"}"#).unwrap();
        router.dispatch(r#"{"type":"keydown","key":"UP"}"#).unwrap();

        // Act
        let released = router.release_all();

        // Assert
        assert_eq!(released, 2);
        assert!(router.held_keys().is_empty());
    }

    #[test]
    fn test_released_key_is_no_longer_held() {
        let mut mock = MockInputInjector::new();
        mock.expect_send_down().returning(|_| Ok(()));
        mock.expect_send_up().times(1).returning(|_| Ok(()));
        let router = router(mock);

        router.dispatch(r#"{"type":"keydown","key":"A"}"#).unwrap();
        router.dispatch(r#"{"type":"keyup","key":"a"}"#).unwrap();

        assert!(router.held_keys().is_empty());
        assert_eq!(router.release_all(), 0);
    }
}
