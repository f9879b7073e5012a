//! Navigation builtins (cd, pwd)

use async_trait::async_trait;

use super::{Builtin, Context, resolve_path};
use crate::error::Result;
use crate::interpreter::ExecResult;

/// The cd builtin - change directory.
///
/// `cd` alone goes to `$HOME`, `cd -` to `$OLDPWD` (and prints it).
/// `PWD` and `OLDPWD` are updated on success.
pub struct Cd;

#[async_trait]
impl Builtin for Cd {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let (target, announce) = match ctx.args.first().map(String::as_str) {
            None => match ctx.env.get("HOME") {
                Some(home) => (home, false),
                None => return Ok(ExecResult::err("cd: HOME not set\n", 1)),
            },
            Some("-") => match ctx.env.get("OLDPWD") {
                Some(old) => (old, true),
                None => return Ok(ExecResult::err("cd: OLDPWD not set\n", 1)),
            },
            Some(dir) => (dir.to_string(), false),
        };

        let new_path = resolve_path(ctx.cwd, &target);
        match std::fs::metadata(&new_path) {
            Ok(meta) if meta.is_dir() => {
                let old = ctx.cwd.to_string_lossy().to_string();
                ctx.env.set("OLDPWD", old);
                ctx.env.set("PWD", new_path.to_string_lossy().to_string());
                *ctx.cwd = new_path;
                if announce {
                    Ok(ExecResult::ok(format!("{}\n", ctx.cwd.display())))
                } else {
                    Ok(ExecResult::status(0))
                }
            }
            Ok(_) => Ok(ExecResult::err(format!("cd: {target}: Not a directory\n"), 1)),
            Err(_) => Ok(ExecResult::err(
                format!("cd: {target}: No such file or directory\n"),
                1,
            )),
        }
    }
}

/// The pwd builtin - print working directory.
pub struct Pwd;

#[async_trait]
impl Builtin for Pwd {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        Ok(ExecResult::ok(format!("{}\n", ctx.cwd.display())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::builtins::TestShell;

    #[tokio::test]
    async fn test_cd_and_pwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let mut sh = TestShell::new();
        sh.cwd = dir.path().to_path_buf();

        let result = sh.run(&Cd, &["sub"]).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(sh.cwd, dir.path().join("sub"));
        assert_eq!(sh.env.get("OLDPWD"), Some(dir.path().to_string_lossy().to_string()));

        let result = sh.run(&Pwd, &[]).await.unwrap();
        assert_eq!(result.stdout, format!("{}\n", dir.path().join("sub").display()));

        let result = sh.run(&Cd, &["-"]).await.unwrap();
        assert_eq!(result.stdout, format!("{}\n", dir.path().display()));
        assert_eq!(sh.cwd, dir.path());
    }

    #[tokio::test]
    async fn test_cd_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file"), "").unwrap();
        let mut sh = TestShell::new();
        sh.cwd = dir.path().to_path_buf();

        let result = sh.run(&Cd, &["missing"]).await.unwrap();
        assert_eq!(result.exit_code, 1);
        assert!(result.stderr.contains("No such file or directory"));

        let result = sh.run(&Cd, &["file"]).await.unwrap();
        assert!(result.stderr.contains("Not a directory"));

        let result = sh.run(&Cd, &[]).await.unwrap();
        assert!(result.stderr.contains("HOME not set"));
    }
}
