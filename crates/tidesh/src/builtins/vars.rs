//! Variable and option builtins (export, unset, local, declare, shift, set, shopt)

use async_trait::async_trait;

use super::{Builtin, Context};
use crate::error::Result;
use crate::interpreter::{Environment, ExecResult, VarKind};
use crate::options::ShellOption;
use crate::parser::is_valid_name;

/// Quote a value so the shell would read it back unchanged.
pub(crate) fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | ',' | '+' | '@' | '%'));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

/// Split `name=value` / `name+=value`. A bare name has no value.
fn split_assignment(arg: &str) -> (&str, Option<&str>, bool) {
    match arg.find('=') {
        Some(eq) => {
            let (name, append) = match arg[..eq].strip_suffix('+') {
                Some(name) => (name, true),
                None => (&arg[..eq], false),
            };
            (name, Some(&arg[eq + 1..]), append)
        }
        None => (arg, None, false),
    }
}

fn assign_text(env: &mut Environment, name: &str, value: &str, append: bool) {
    if append {
        env.append(name, value);
    } else {
        env.set(name, value);
    }
}

/// The export builtin - mark variables for child processes.
pub struct Export;

#[async_trait]
impl Builtin for Export {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let args: Vec<&String> = ctx.args.iter().filter(|a| a.as_str() != "-p").collect();
        if args.is_empty() {
            let mut output = String::new();
            for (name, value) in ctx.env.exported_vars() {
                output.push_str(&format!("declare -x {name}={}\n", shell_quote(&value)));
            }
            return Ok(ExecResult::ok(output));
        }

        let mut stderr = String::new();
        for arg in args {
            let (name, value, append) = split_assignment(arg);
            if !is_valid_name(name) {
                stderr.push_str(&format!("export: `{arg}': not a valid identifier\n"));
                continue;
            }
            if let Some(value) = value {
                assign_text(ctx.env, name, value, append);
            }
            ctx.env.export(name);
        }
        if stderr.is_empty() {
            Ok(ExecResult::status(0))
        } else {
            Ok(ExecResult::err(stderr, 1))
        }
    }
}

/// The unset builtin - remove variables or array elements.
pub struct Unset;

#[async_trait]
impl Builtin for Unset {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        for arg in ctx.args.iter().filter(|a| a.as_str() != "-v") {
            match arg.find('[') {
                Some(open) if arg.ends_with(']') => {
                    ctx.env.unset_element(&arg[..open], &arg[open + 1..arg.len() - 1]);
                }
                _ => ctx.env.unset(arg),
            }
        }
        Ok(ExecResult::status(0))
    }
}

/// The local builtin - names removed again when the function returns.
pub struct Local;

#[async_trait]
impl Builtin for Local {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if !ctx.env.in_function() {
            return Ok(ExecResult::err("local: can only be used in a function\n", 1));
        }
        declare(ctx, "local")
    }
}

/// The declare/typeset builtin.
///
/// Supports `-a` (indexed array), `-A` (associative array), `-x` (export),
/// `-g` (global inside a function) and `-p` (print).
pub struct Declare;

#[async_trait]
impl Builtin for Declare {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        declare(ctx, "declare")
    }
}

fn declare(ctx: Context<'_>, builtin: &str) -> Result<ExecResult> {
    let mut kind = None;
    let mut export = false;
    let mut global = false;
    let mut print = false;
    let mut names = Vec::new();

    for arg in ctx.args {
        match arg.strip_prefix('-') {
            Some(flags) if !flags.is_empty() && names.is_empty() => {
                for flag in flags.chars() {
                    match flag {
                        'a' => kind = Some(VarKind::Indexed),
                        'A' => kind = Some(VarKind::Associative),
                        'x' => export = true,
                        'g' => global = true,
                        'p' => print = true,
                        // integer/readonly attributes are accepted and ignored
                        'i' | 'r' | 'l' | 'u' => {}
                        _ => {
                            return Ok(ExecResult::err(
                                format!("{builtin}: -{flag}: invalid option\n"),
                                2,
                            ));
                        }
                    }
                }
            }
            _ => names.push(arg.as_str()),
        }
    }

    if print {
        return Ok(print_declarations(ctx.env, &names));
    }

    let mut stderr = String::new();
    for arg in names {
        let (name, value, append) = split_assignment(arg);
        if !is_valid_name(name) {
            stderr.push_str(&format!("{builtin}: `{arg}': not a valid identifier\n"));
            continue;
        }
        let scoped = ctx.env.in_function() && (builtin == "local" || !global);
        if scoped {
            ctx.env.declare_local(name);
        }
        match kind {
            Some(VarKind::Indexed) => ctx.env.declare_indexed(name),
            Some(VarKind::Associative) => ctx.env.declare_associative(name),
            _ => {}
        }
        if let Some(value) = value {
            assign_text(ctx.env, name, value, append);
        } else if scoped && kind.is_none() {
            // a bare local starts out empty, hiding the caller's value
            ctx.env.unset(name);
            ctx.env.set(name, "");
        }
        if export {
            ctx.env.export(name);
        }
    }

    if stderr.is_empty() {
        Ok(ExecResult::status(0))
    } else {
        Ok(ExecResult::err(stderr, 1))
    }
}

fn print_declarations(env: &Environment, names: &[&str]) -> ExecResult {
    let names: Vec<String> = if names.is_empty() {
        env.snapshot().into_keys().collect()
    } else {
        names.iter().map(|n| n.to_string()).collect()
    };

    let mut output = String::new();
    let mut missing = String::new();
    for name in names {
        let flag = match env.kind(&name) {
            None => {
                missing.push_str(&format!("declare: {name}: not found\n"));
                continue;
            }
            Some(VarKind::Indexed) => "-a",
            Some(VarKind::Associative) => "-A",
            Some(VarKind::Scalar) if env.is_exported(&name) => "-x",
            Some(VarKind::Scalar) => "--",
        };
        let value = match env.kind(&name) {
            Some(VarKind::Scalar) => shell_quote(&env.get(&name).unwrap_or_default()),
            _ => {
                let items: Vec<String> = env
                    .keys(&name)
                    .into_iter()
                    .zip(env.values(&name))
                    .map(|(k, v)| format!("[{k}]={}", shell_quote(&v)))
                    .collect();
                format!("({})", items.join(" "))
            }
        };
        output.push_str(&format!("declare {flag} {name}={value}\n"));
    }
    ExecResult {
        stdout: output,
        exit_code: if missing.is_empty() { 0 } else { 1 },
        stderr: missing,
    }
}

/// The shift builtin - drop leading positional parameters.
pub struct Shift;

#[async_trait]
impl Builtin for Shift {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let n = match ctx.args.first() {
            None => 1,
            Some(arg) => match arg.parse::<usize>() {
                Ok(n) => n,
                Err(_) => {
                    return Ok(ExecResult::err(
                        format!("shift: {arg}: numeric argument required\n"),
                        1,
                    ));
                }
            },
        };
        Ok(ExecResult::status(if ctx.env.shift(n) { 0 } else { 1 }))
    }
}

/// The set builtin - shell options and positional parameters.
///
/// `set -e`/`+e` and friends toggle single-letter options, `-o name` the
/// long ones; `set -o` alone lists them. Remaining words (or everything
/// after `--`) replace `$1..$N`. Without arguments every variable is
/// printed.
pub struct Set;

#[async_trait]
impl Builtin for Set {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        if ctx.args.is_empty() {
            let mut output = String::new();
            for (name, value) in ctx.env.snapshot() {
                output.push_str(&format!("{name}={}\n", shell_quote(&value)));
            }
            return Ok(ExecResult::ok(output));
        }

        let mut args = ctx.args.iter();
        let mut positional: Option<Vec<String>> = None;
        while let Some(arg) = args.next() {
            if arg == "--" {
                positional = Some(args.by_ref().cloned().collect());
                break;
            }
            let (on, flags) = match (arg.strip_prefix('-'), arg.strip_prefix('+')) {
                (Some(flags), _) if !flags.is_empty() => (true, flags),
                (_, Some(flags)) if !flags.is_empty() => (false, flags),
                _ => {
                    let mut rest = vec![arg.clone()];
                    rest.extend(args.by_ref().cloned());
                    positional = Some(rest);
                    break;
                }
            };
            for flag in flags.chars() {
                if flag == 'o' {
                    let Some(name) = args.next() else {
                        return Ok(ExecResult::ok(list_options(ctx.options, on)));
                    };
                    match ShellOption::from_name(name).filter(|o| !o.is_shopt()) {
                        Some(opt) => ctx.options.set(opt, on),
                        None => {
                            return Ok(ExecResult::err(
                                format!("set: {name}: invalid option name\n"),
                                1,
                            ));
                        }
                    }
                    continue;
                }
                match ShellOption::from_short(flag) {
                    Some(opt) => ctx.options.set(opt, on),
                    None => {
                        return Ok(ExecResult::err(format!("set: -{flag}: invalid option\n"), 2));
                    }
                }
            }
        }

        if let Some(args) = positional {
            ctx.env.set_positional(args);
        }
        Ok(ExecResult::status(0))
    }
}

fn list_options(options: &crate::options::ShellOptions, human: bool) -> String {
    let mut output = String::new();
    for opt in ShellOption::ALL.iter().filter(|o| !o.is_shopt()) {
        let on = options.is_set(*opt);
        if human {
            output.push_str(&format!("{:<15}\t{}\n", opt.name(), if on { "on" } else { "off" }));
        } else {
            output.push_str(&format!("set {}o {}\n", if on { '-' } else { '+' }, opt.name()));
        }
    }
    output
}

/// The shopt builtin - `globstar`, `nullglob`, `dotglob`.
pub struct Shopt;

#[async_trait]
impl Builtin for Shopt {
    async fn execute(&self, ctx: Context<'_>) -> Result<ExecResult> {
        let mut mode = None;
        let mut quiet = false;
        let mut names = Vec::new();
        for arg in ctx.args {
            match arg.as_str() {
                "-s" => mode = Some(true),
                "-u" => mode = Some(false),
                "-q" => quiet = true,
                name => names.push(name),
            }
        }

        let mut opts = Vec::new();
        for name in &names {
            match ShellOption::from_name(name).filter(|o| o.is_shopt()) {
                Some(opt) => opts.push(opt),
                None => {
                    return Ok(ExecResult::err(
                        format!("shopt: {name}: invalid shell option name\n"),
                        1,
                    ));
                }
            }
        }
        if opts.is_empty() && names.is_empty() {
            opts = ShellOption::ALL.iter().copied().filter(|o| o.is_shopt()).collect();
        }

        if let Some(on) = mode {
            for opt in opts {
                ctx.options.set(opt, on);
            }
            return Ok(ExecResult::status(0));
        }

        let all_on = opts.iter().all(|o| ctx.options.is_set(*o));
        let mut output = String::new();
        if !quiet {
            for opt in &opts {
                let state = if ctx.options.is_set(*opt) { "on" } else { "off" };
                output.push_str(&format!("{:<15}\t{state}\n", opt.name()));
            }
        }
        Ok(ExecResult {
            stdout: output,
            stderr: String::new(),
            exit_code: if all_on { 0 } else { 1 },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::builtins::TestShell;

    #[tokio::test]
    async fn test_export_marks_and_assigns() {
        let mut sh = TestShell::new();
        sh.run(&Export, &["A=1", "B"]).await.unwrap();
        assert!(sh.env.is_exported("A"));
        assert!(sh.env.is_exported("B"));
        assert_eq!(sh.env.get("A").as_deref(), Some("1"));
        let listing = sh.run(&Export, &[]).await.unwrap().stdout;
        assert_eq!(listing, "declare -x A=1\n");
        let bad = sh.run(&Export, &["1x=2"]).await.unwrap();
        assert_eq!(bad.exit_code, 1);
    }

    #[tokio::test]
    async fn test_unset_variable_and_element() {
        let mut sh = TestShell::new();
        sh.env.set("X", "1");
        sh.env.set_array("a", vec!["p".into(), "q".into()]);
        sh.run(&Unset, &["X", "a[1]"]).await.unwrap();
        assert!(!sh.env.is_set("X"));
        assert_eq!(sh.env.values("a"), vec!["p"]);
    }

    #[tokio::test]
    async fn test_local_requires_function() {
        let mut sh = TestShell::new();
        let result = sh.run(&Local, &["x=1"]).await.unwrap();
        assert_eq!(result.exit_code, 1);

        let scope = sh.env.enter_function("f", Vec::new());
        sh.run(&Local, &["x=1", "y"]).await.unwrap();
        assert_eq!(sh.env.get("x").as_deref(), Some("1"));
        assert_eq!(sh.env.get("y").as_deref(), Some(""));
        sh.env.leave_function(scope);
        assert!(!sh.env.is_set("x"));
        assert!(!sh.env.is_set("y"));
    }

    #[tokio::test]
    async fn test_declare_kinds_and_print() {
        let mut sh = TestShell::new();
        sh.run(&Declare, &["-A", "m"]).await.unwrap();
        assert_eq!(sh.env.kind("m"), Some(VarKind::Associative));
        sh.env.set_assoc_element("m", "k", "v w");
        sh.run(&Declare, &["-a", "list"]).await.unwrap();
        sh.run(&Declare, &["-x", "s=plain"]).await.unwrap();
        assert_eq!(sh.env.kind("list"), Some(VarKind::Indexed));
        assert!(sh.env.is_exported("s"));

        let printed = sh.run(&Declare, &["-p", "m", "s"]).await.unwrap();
        assert_eq!(printed.stdout, "declare -A m=([k]='v w')\ndeclare -x s=plain\n");
        let missing = sh.run(&Declare, &["-p", "nope"]).await.unwrap();
        assert_eq!(missing.exit_code, 1);
    }

    #[tokio::test]
    async fn test_shift() {
        let mut sh = TestShell::new();
        sh.env.set_positional(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(sh.run(&Shift, &[]).await.unwrap().exit_code, 0);
        assert_eq!(sh.run(&Shift, &["2"]).await.unwrap().exit_code, 0);
        assert!(sh.env.positional().is_empty());
        assert_eq!(sh.run(&Shift, &[]).await.unwrap().exit_code, 1);
    }

    #[tokio::test]
    async fn test_set_options_and_positional() {
        let mut sh = TestShell::new();
        sh.run(&Set, &["-eu", "-o", "pipefail"]).await.unwrap();
        assert!(sh.options.is_set(ShellOption::Errexit));
        assert!(sh.options.is_set(ShellOption::Nounset));
        assert!(sh.options.is_set(ShellOption::Pipefail));
        sh.run(&Set, &["+e"]).await.unwrap();
        assert!(!sh.options.is_set(ShellOption::Errexit));

        sh.run(&Set, &["--", "x", "-y"]).await.unwrap();
        assert_eq!(sh.env.positional(), ["x".to_string(), "-y".to_string()]);
        sh.run(&Set, &["a", "b"]).await.unwrap();
        assert_eq!(sh.env.positional().len(), 2);

        let listing = sh.run(&Set, &["-o"]).await.unwrap().stdout;
        assert!(listing.contains("pipefail"));
        assert!(listing.contains("on"));

        let bad = sh.run(&Set, &["-o", "globstar"]).await.unwrap();
        assert_eq!(bad.exit_code, 1);
    }

    #[tokio::test]
    async fn test_shopt() {
        let mut sh = TestShell::new();
        sh.run(&Shopt, &["-s", "globstar", "nullglob"]).await.unwrap();
        assert!(sh.options.is_set(ShellOption::Globstar));
        let query = sh.run(&Shopt, &["-q", "nullglob"]).await.unwrap();
        assert_eq!(query.exit_code, 0);
        assert!(query.stdout.is_empty());
        sh.run(&Shopt, &["-u", "nullglob"]).await.unwrap();
        assert_eq!(sh.run(&Shopt, &["nullglob"]).await.unwrap().exit_code, 1);
        assert_eq!(sh.run(&Shopt, &["-s", "errexit"]).await.unwrap().exit_code, 1);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "plain");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
