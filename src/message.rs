//! Diagnostic and error message routing.
//!
//! Every component reports through a [`Messenger`], which sends each line
//! to its configured [`MessageDest`]: dropped, printed to stderr, or kept
//! in an in-memory log for the caller to drain.

use std::fmt;

use crate::types::MessageDest;

/// Routes messages for one drive or stream.
#[derive(Debug, Default)]
pub struct Messenger {
    error_dest: MessageDest,
    message_dest: MessageDest,
    errors: Vec<String>,
    messages: Vec<String>,
}

impl Messenger {
    #[must_use]
    pub fn new(error_dest: MessageDest, message_dest: MessageDest) -> Self {
        Self {
            error_dest,
            message_dest,
            errors: Vec::new(),
            messages: Vec::new(),
        }
    }

    /// Change where errors and messages go. Already logged lines are kept.
    pub fn set_verbose(&mut self, error_dest: MessageDest, message_dest: MessageDest) {
        self.error_dest = error_dest;
        self.message_dest = message_dest;
    }

    #[must_use]
    pub fn error_dest(&self) -> MessageDest {
        self.error_dest
    }

    #[must_use]
    pub fn message_dest(&self) -> MessageDest {
        self.message_dest
    }

    /// Report a diagnostic message.
    pub fn message(&mut self, args: fmt::Arguments<'_>) {
        Self::route(self.message_dest, &mut self.messages, args);
    }

    /// Report an error condition.
    pub fn error(&mut self, args: fmt::Arguments<'_>) {
        Self::route(self.error_dest, &mut self.errors, args);
    }

    fn route(dest: MessageDest, log: &mut Vec<String>, args: fmt::Arguments<'_>) {
        match dest {
            MessageDest::ForgetIt => {}
            MessageDest::PrintIt => eprintln!("audiocd: {args}"),
            MessageDest::LogIt => log.push(args.to_string()),
        }
    }

    /// Drain logged diagnostic messages.
    pub fn take_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }

    /// Drain logged error messages.
    pub fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.errors)
    }

    /// Move everything logged in `other` into this log.
    pub fn absorb(&mut self, other: &mut Messenger) {
        self.messages.append(&mut other.messages);
        self.errors.append(&mut other.errors);
    }
}
