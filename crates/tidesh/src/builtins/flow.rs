//! Flow control builtins (:, true, false, exit)

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::{Error, Result};
use crate::interpreter::ExecResult;

/// The `:` builtin - does nothing, successfully.
pub struct Colon;

#[async_trait]
impl Builtin for Colon {
    async fn execute(&self, _ctx: Context<'_>) -> Result<ExecResult> {
        Ok(ExecResult::status(0))
    }
}

/// The true builtin - always returns 0.
pub struct True;

#[async_trait]
impl Builtin for True {
    async fn execute(&self, _ctx: Context<'_>) -> Result<ExecResult> {
        Ok(ExecResult::status(0))
    }
}

/// The false builtin - always returns 1.
pub struct False;

#[async_trait]
impl Builtin for False {
    async fn execute(&self, _ctx: Context<'_>) -> Result<ExecResult> {
        Ok(ExecResult::status(1))
    }
}

/// The exit builtin - exit the shell with a status code.
///
/// With no argument the status of the previous command is used. Statuses
/// wrap to `0..=255` like a process exit code.
pub struct Exit;

#[async_trait]
impl Builtin for Exit {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let code = match ctx.args.first() {
            None => ctx.last_status,
            Some(arg) => match arg.parse::<i64>() {
                Ok(n) => n.rem_euclid(256) as i32,
                Err(_) => {
                    return Ok(ExecResult::err(
                        format!("exit: {arg}: numeric argument required\n"),
                        2,
                    ));
                }
            },
        };
        Err(Error::Exit(code))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::builtins::TestShell;

    #[tokio::test]
    async fn test_true_false_colon() {
        let mut sh = TestShell::new();
        assert_eq!(sh.run(&True, &[]).await.unwrap().exit_code, 0);
        assert_eq!(sh.run(&False, &[]).await.unwrap().exit_code, 1);
        assert_eq!(sh.run(&Colon, &["ignored"]).await.unwrap().exit_code, 0);
    }

    #[tokio::test]
    async fn test_exit_requests_termination() {
        let mut sh = TestShell::new();
        assert!(matches!(sh.run(&Exit, &["3"]).await, Err(Error::Exit(3))));
        assert!(matches!(sh.run(&Exit, &["257"]).await, Err(Error::Exit(1))));
        assert!(matches!(sh.run(&Exit, &["-1"]).await, Err(Error::Exit(255))));
    }

    #[tokio::test]
    async fn test_exit_rejects_non_numeric() {
        let mut sh = TestShell::new();
        let result = sh.run(&Exit, &["abc"]).await.unwrap();
        assert_eq!(result.exit_code, 2);
        assert!(result.stderr.contains("numeric argument required"));
    }
}
