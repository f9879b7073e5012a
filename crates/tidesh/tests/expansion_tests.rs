//! Word expansion through the public Shell API
//!
//! Covers: arithmetic precedence and errors, parameter operators, IFS field
//! splitting, `$@` quoting, arrays, command substitution, brace and tilde
//! expansion, globbing, and the `set -u` / `${v:?}` failures.

use tidesh::{Shell, ShellOption};

fn shell() -> Shell {
    let mut builder = Shell::builder().clear_env().env("HOME", "/home/tester");
    if let Ok(path) = std::env::var("PATH") {
        builder = builder.env("PATH", path);
    }
    builder.build()
}

async fn stdout(script: &str) -> String {
    shell().exec(script).await.unwrap().stdout
}

#[tokio::test]
async fn arithmetic_precedence() {
    assert_eq!(stdout("echo $((1 + 2 * 3)) $(((1 + 2) * 3)) $((2 ** 10))").await, "7 9 1024\n");
    assert_eq!(stdout("echo $((7 / 2)) $((-7 % 3)) $((1 << 4 | 1))").await, "3 -1 17\n");
}

#[tokio::test]
async fn arithmetic_variables_and_assignment() {
    let out = stdout("x=4; echo $((x * x)) $(( $x + 1 )); (( y = x + 2 )); echo $y; echo $((undefined_name + 1))").await;
    assert_eq!(out, "16 5\n6\n1\n");
}

#[tokio::test]
async fn division_by_zero_fails_the_command() {
    let result = shell().exec("echo $((1 / 0)); echo next").await.unwrap();
    assert_eq!(result.stdout, "next\n");
    assert!(result.stderr.contains("division by 0"), "stderr: {}", result.stderr);
    assert_eq!(result.exit_code, 0);

    let result = shell().exec("echo $((5 % 0))").await.unwrap();
    assert_eq!(result.exit_code, 1);
}

#[tokio::test]
async fn default_and_pattern_removal() {
    let out = stdout("unset VAR; echo ${VAR:-default}; VAR=foo.txt; echo ${VAR%.txt} ${VAR#*.}").await;
    assert_eq!(out, "default\nfoo txt\n");
}

#[tokio::test]
async fn longest_and_shortest_matches() {
    let out = stdout("p=/usr/local/lib/file.tar.gz; echo ${p##*/} ${p%%.*} ${p%.*} ${p#/*/}").await;
    assert_eq!(out, "file.tar.gz /usr/local/lib/file /usr/local/lib/file.tar local/lib/file.tar.gz\n");
}

#[tokio::test]
async fn colon_forms_treat_empty_as_missing() {
    let out = stdout("e=; echo \"[${e-unset}] [${e:-empty}] [${e+set}] [${e:+nonempty}]\"").await;
    assert_eq!(out, "[] [empty] [set] []\n");
}

#[tokio::test]
async fn assign_default_sets_variable() {
    assert_eq!(stdout("echo ${x:=val}; echo $x").await, "val\nval\n");
}

#[tokio::test]
async fn length_substring_replace_case() {
    let out = stdout("s=hello; echo ${#s} ${s:1:3} ${s: -3} ${s/l/L} ${s//l/L} ${s^} ${s^^}").await;
    assert_eq!(out, "5 ell llo heLlo heLLo Hello HELLO\n");
}

#[tokio::test]
async fn substring_length_past_end_is_clamped() {
    let out = stdout("v=abc; echo ${v:1:9223372036854775807}; set -- a b c; echo ${@:1:9223372036854775807}").await;
    assert_eq!(out, "bc\na b c\n");
    assert_eq!(stdout("v=abc; echo \"[${v: -9223372036854775807}]\"").await, "[]\n");
}

#[tokio::test]
async fn indirect_expansion() {
    assert_eq!(stdout("target=value; ref=target; echo ${!ref}").await, "value\n");
}

#[tokio::test]
async fn default_ifs_splits_on_whitespace_runs() {
    let out = stdout("v=\"a  b\tc\"; for w in $v; do echo \"[$w]\"; done").await;
    assert_eq!(out, "[a]\n[b]\n[c]\n");
}

#[tokio::test]
async fn custom_ifs_splits_on_colon() {
    let out = stdout("IFS=:; v=a:b:c; for w in $v; do echo $w; done").await;
    assert_eq!(out, "a\nb\nc\n");
}

#[tokio::test]
async fn quoted_expansion_is_not_split() {
    let out = stdout("v=\"a  b\"; for w in \"$v\"; do echo \"[$w]\"; done").await;
    assert_eq!(out, "[a  b]\n");
}

#[tokio::test]
async fn quoted_at_preserves_arguments() {
    let out = stdout("f() { for a in \"$@\"; do echo \"<$a>\"; done; echo $#; }; f \"x y\" z").await;
    assert_eq!(out, "<x y>\n<z>\n2\n");
}

#[tokio::test]
async fn quoted_star_joins_with_ifs() {
    let out = stdout("f() { IFS=,; echo \"$*\"; }; f a b c").await;
    assert_eq!(out, "a,b,c\n");
}

#[tokio::test]
async fn indexed_arrays() {
    let out = stdout("a=(one two three); echo ${a[1]} ${#a[@]}; a+=(four); echo ${a[3]} ${a[-1]}; a[6]=x; echo ${#a[@]}").await;
    assert_eq!(out, "two 3\nfour four\n5\n");
}

#[tokio::test]
async fn indexed_arrays_are_sparse() {
    let out = stdout("a[9223372036854775807]=x; a[2]=y; echo ${#a[@]} ${!a[@]} ${a[@]} ${a[-1]}; echo ok").await;
    assert_eq!(out, "2 2 9223372036854775807 y x x\nok\n");
    let out = stdout("a=(p q r); unset 'a[1]'; a+=(s); echo ${!a[@]} ${a[@]}").await;
    assert_eq!(out, "0 2 3 p r s\n");
}

#[tokio::test]
async fn associative_arrays() {
    let out = stdout("declare -A m; m[k]=v; m[j]=w; echo ${m[k]} ${!m[@]}; echo ${#m[@]}").await;
    assert_eq!(out, "v j k\n2\n");
}

#[tokio::test]
async fn command_substitution_strips_trailing_newlines() {
    let out = stdout("x=$(echo hi; echo there); echo \"$x\"; echo $(echo $(echo deep))").await;
    assert_eq!(out, "hi\nthere\ndeep\n");
}

#[tokio::test]
async fn command_substitution_does_not_leak_assignments() {
    assert_eq!(stdout("y=1; z=$(y=2; echo $y); echo $y $z").await, "1 2\n");
}

#[tokio::test]
async fn assignment_status_comes_from_substitution() {
    assert_eq!(stdout("x=$(false); echo $?; y=$(true); echo $?").await, "1\n0\n");
}

#[tokio::test]
async fn brace_expansion() {
    assert_eq!(stdout("echo a{1,2,3}b {x,y} {1..3}").await, "a1b a2b a3b x y 1 2 3\n");
    assert_eq!(stdout("echo \"{a,b}\"").await, "{a,b}\n");
}

#[tokio::test]
async fn tilde_expansion() {
    assert_eq!(
        stdout("echo ~ ~/docs \"~\"").await,
        "/home/tester /home/tester/docs ~\n"
    );
}

#[tokio::test]
async fn pathname_expansion() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.txt", "b.txt", "c.log", ".hidden.txt"] {
        std::fs::write(dir.path().join(name), "").unwrap();
    }
    let mut sh = Shell::builder().clear_env().cwd(dir.path()).build();

    assert_eq!(sh.exec("echo *.txt").await.unwrap().stdout, "a.txt b.txt\n");
    assert_eq!(sh.exec("echo ?.log").await.unwrap().stdout, "c.log\n");
    assert_eq!(sh.exec("echo \"*.txt\"").await.unwrap().stdout, "*.txt\n");
    assert_eq!(sh.exec("echo *.none").await.unwrap().stdout, "*.none\n");
    assert_eq!(sh.exec("shopt -s nullglob; echo x *.none y").await.unwrap().stdout, "x y\n");
    assert_eq!(
        sh.exec("shopt -s dotglob; echo *.txt").await.unwrap().stdout,
        ".hidden.txt a.txt b.txt\n"
    );
    assert_eq!(sh.exec("set -f; echo *.log").await.unwrap().stdout, "*.log\n");
}

#[tokio::test]
async fn nounset_stops_the_script() {
    let result = shell().exec("set -u; echo $nope; echo after").await.unwrap();
    assert_eq!(result.stdout, "");
    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.contains("nope: unbound variable"));
}

#[tokio::test]
async fn nounset_from_builder() {
    let mut sh = Shell::builder().clear_env().option(ShellOption::Nounset).build();
    let result = sh.exec("echo ${nope:-ok}; echo $nope").await.unwrap();
    assert_eq!(result.stdout, "ok\n");
    assert_eq!(result.exit_code, 1);
}

#[tokio::test]
async fn error_operator_reports_message() {
    let result = shell().exec("echo ${NOPE:?missing value}; echo after").await.unwrap();
    assert_eq!(result.stdout, "");
    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.contains("NOPE: missing value"));
}

#[tokio::test]
async fn special_parameters() {
    let mut sh = Shell::builder().clear_env().script_name("prog").args(["one", "two"]).build();
    let out = sh.exec("false; echo $? $# $0 $1 $2 \"$3\"").await.unwrap().stdout;
    assert_eq!(out, "1 2 prog one two \n");
}

#[tokio::test]
async fn random_is_reseedable() {
    let mut sh = shell();
    let first = sh.exec("RANDOM=42; echo $RANDOM $RANDOM").await.unwrap().stdout;
    let second = sh.exec("RANDOM=42; echo $RANDOM $RANDOM").await.unwrap().stdout;
    assert_eq!(first, second);
    for n in first.split_whitespace() {
        let n: i64 = n.parse().unwrap();
        assert!((0..32768).contains(&n));
    }
}
