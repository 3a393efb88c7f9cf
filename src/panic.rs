//! Panic payload inspection.
//!
//! `catch_unwind` hands back the panic payload as `Box<dyn Any + Send>`. The
//! helpers here look inside it without consuming it, so the payload can still
//! be re-raised unchanged afterwards.

use std::any::Any;
use std::error::Error as StdError;
use std::io;

use crate::error::BoxError;

/// Returns the panic message when the payload is a string or an error.
///
/// `panic!("literal")` produces a `&'static str`, `panic!("{x}")` a `String`.
/// Errors raised with `std::panic::panic_any` are rendered with `Display`.
pub fn message(payload: &(dyn Any + Send)) -> Option<String> {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        Some((*s).to_owned())
    } else if let Some(s) = payload.downcast_ref::<String>() {
        Some(s.clone())
    } else {
        as_error(payload).map(ToString::to_string)
    }
}

/// Views the payload as an error, if it is one of the error types we know how
/// to recognise.
pub fn as_error(payload: &(dyn Any + Send)) -> Option<&(dyn StdError + 'static)> {
    if let Some(err) = payload.downcast_ref::<io::Error>() {
        Some(err as &(dyn StdError + 'static))
    } else if let Some(err) = payload.downcast_ref::<BoxError>() {
        Some(&**err as &(dyn StdError + 'static))
    } else {
        None
    }
}

/// Whether the payload is a broken-pipe or connection-reset network error.
///
/// Such panics mean the peer went away mid-response. There is nothing to fix on
/// our side, so they are not worth reporting.
pub fn is_broken_pipe(payload: &(dyn Any + Send)) -> bool {
    let mut cur = as_error(payload);
    while let Some(err) = cur {
        if let Some(io_err) = err.downcast_ref::<io::Error>()
            && io_is_broken_pipe(io_err)
        {
            return true;
        }
        cur = err.source();
    }
    false
}

fn io_is_broken_pipe(err: &io::Error) -> bool {
    if matches!(err.kind(), io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset) {
        return true;
    }
    let msg = err.to_string().to_lowercase();
    msg.contains("broken pipe") || msg.contains("connection reset by peer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn boxed<T: Any + Send>(v: T) -> Box<dyn Any + Send> {
        Box::new(v)
    }

    #[rstest]
    #[case::kind_broken_pipe(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"))]
    #[case::kind_reset(io::Error::new(io::ErrorKind::ConnectionReset, "read failed"))]
    #[case::message_broken_pipe(io::Error::other("write: broken pipe"))]
    #[case::message_mixed_case(io::Error::other("read tcp: Connection Reset By Peer"))]
    #[case::os_epipe(io::Error::from_raw_os_error(32))]
    fn broken_pipe_io_errors_are_suppressed(#[case] err: io::Error) {
        assert!(is_broken_pipe(boxed(err).as_ref()));
    }

    #[test]
    fn broken_pipe_inside_boxed_error_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("flush response")]
        struct Flush(#[source] io::Error);

        let err: BoxError = Box::new(Flush(io::Error::other("write: broken pipe")));
        assert!(is_broken_pipe(boxed(err).as_ref()));
    }

    #[rstest]
    #[case::plain_str(boxed("boom"))]
    #[case::string(boxed(String::from("write: broken pipe")))]
    #[case::other_io(boxed(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded")))]
    #[case::integer(boxed(42_u8))]
    fn everything_else_is_reportable(#[case] payload: Box<dyn Any + Send>) {
        assert!(!is_broken_pipe(payload.as_ref()));
    }

    #[test]
    fn message_reads_strings_and_errors() {
        assert_eq!(message(boxed("boom").as_ref()).as_deref(), Some("boom"));
        assert_eq!(message(boxed(String::from("bang")).as_ref()).as_deref(), Some("bang"));
        assert_eq!(
            message(boxed(io::Error::other("disk on fire")).as_ref()).as_deref(),
            Some("disk on fire"),
        );
        assert_eq!(message(boxed(7_i32).as_ref()), None);
    }
}
