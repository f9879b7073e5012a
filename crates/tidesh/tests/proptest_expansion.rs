//! Property-based tests for expansion
//!
//! Arithmetic must agree with wrapping i64 semantics. Text without any
//! expansion trigger must come back from the expander untouched.

use proptest::prelude::*;
use tidesh::Shell;

async fn eval_arithmetic(expr: &str) -> Option<i64> {
    let mut sh = Shell::builder().clear_env().build();
    let script = format!("echo $(({expr}))");
    match sh.exec(&script).await {
        Ok(result) if result.exit_code == 0 => result.stdout.trim().parse().ok(),
        _ => None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn addition_matches_i64(a in -100_000i64..100_000, b in -100_000i64..100_000) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(eval_arithmetic(&format!("{a} + {b}")));
        prop_assert_eq!(result, Some(a + b));
    }

    #[test]
    fn multiplication_matches_i64(a in -1000i64..1000, b in -1000i64..1000) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(eval_arithmetic(&format!("{a} * {b}")));
        prop_assert_eq!(result, Some(a * b));
    }

    /// Division truncates toward zero and `%` keeps the dividend's sign
    #[test]
    fn division_and_modulo_truncate(a in -1000i64..1000, b in 1i64..50) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let quotient = rt.block_on(eval_arithmetic(&format!("{a} / {b}")));
        let remainder = rt.block_on(eval_arithmetic(&format!("{a} % {b}")));
        prop_assert_eq!(quotient, Some(a / b));
        prop_assert_eq!(remainder, Some(a % b));
    }

    #[test]
    fn comparisons_yield_zero_or_one(a in -100i64..100, b in -100i64..100) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        for (op, expected) in [("<", a < b), ("==", a == b), (">=", a >= b)] {
            let result = rt.block_on(eval_arithmetic(&format!("{a} {op} {b}")));
            prop_assert_eq!(result, Some(i64::from(expected)));
        }
    }

    /// Unquoted expansion splits on whitespace runs of any length
    #[test]
    fn default_ifs_recovers_words(
        words in prop::collection::vec("[a-z0-9]{1,6}", 1..8),
        gaps in prop::collection::vec("[ \t]{1,3}", 8),
    ) {
        let joined: String = words
            .iter()
            .zip(&gaps)
            .map(|(w, gap)| format!("{w}{gap}"))
            .collect();
        let script = format!("v='{joined}'; for w in $v; do echo \"$w\"; done");
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut sh = Shell::builder().clear_env().build();
        let out = rt.block_on(sh.exec(&script)).unwrap().stdout;
        let expected: String = words.iter().map(|w| format!("{w}\n")).collect();
        prop_assert_eq!(out, expected);
    }

    /// Text with no `$` and no backquote is returned as-is
    #[test]
    fn plain_text_expands_to_itself(text in "[a-zA-Z0-9 _.,:;*?\\[\\]{}~'\"\\\\/-]{0,40}") {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut sh = Shell::builder().clear_env().build();
        let expanded = rt.block_on(sh.expand(&text)).unwrap();
        prop_assert_eq!(expanded, text);
    }
}

#[test]
fn overflow_wraps() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let result = rt.block_on(eval_arithmetic("9223372036854775807 + 1"));
    assert_eq!(result, Some(i64::MIN));
}
