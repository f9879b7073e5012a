//! Shell option flags (`set -e`, `shopt -s globstar`, ...)

use std::collections::BTreeSet;
use std::fmt;

/// A named boolean shell option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShellOption {
    /// `-e`: exit on the first failing command outside a condition
    Errexit,
    /// `-u`: referencing an unset variable is an error
    Nounset,
    /// `-x`: print `+ cmd args` before running each command
    Xtrace,
    /// `-f`: disable pathname expansion
    Noglob,
    /// `-C`: `>` refuses to overwrite existing files
    Noclobber,
    /// `-o pipefail`: pipeline status is the last non-zero stage status
    Pipefail,
    /// `shopt globstar`: `**` matches across directories
    Globstar,
    /// `shopt nullglob`: unmatched patterns expand to nothing
    Nullglob,
    /// `shopt dotglob`: patterns match dot-files
    Dotglob,
}

impl ShellOption {
    /// Every option, in listing order.
    pub const ALL: &'static [ShellOption] = &[
        ShellOption::Errexit,
        ShellOption::Noclobber,
        ShellOption::Noglob,
        ShellOption::Nounset,
        ShellOption::Pipefail,
        ShellOption::Xtrace,
        ShellOption::Dotglob,
        ShellOption::Globstar,
        ShellOption::Nullglob,
    ];

    /// Options that have a single-letter `set` flag.
    pub const SHORT: &'static [ShellOption] = &[
        ShellOption::Errexit,
        ShellOption::Noglob,
        ShellOption::Nounset,
        ShellOption::Xtrace,
        ShellOption::Noclobber,
    ];

    /// Single-letter flag used by `set -X` and `$-`.
    pub fn short_flag(self) -> Option<char> {
        match self {
            ShellOption::Errexit => Some('e'),
            ShellOption::Nounset => Some('u'),
            ShellOption::Xtrace => Some('x'),
            ShellOption::Noglob => Some('f'),
            ShellOption::Noclobber => Some('C'),
            _ => None,
        }
    }

    /// Parse a single-letter flag.
    pub fn from_short(flag: char) -> Option<Self> {
        Self::SHORT
            .iter()
            .copied()
            .find(|opt| opt.short_flag() == Some(flag))
    }

    /// Long name used by `set -o NAME` and `shopt -s NAME`.
    pub fn name(self) -> &'static str {
        match self {
            ShellOption::Errexit => "errexit",
            ShellOption::Nounset => "nounset",
            ShellOption::Xtrace => "xtrace",
            ShellOption::Noglob => "noglob",
            ShellOption::Noclobber => "noclobber",
            ShellOption::Pipefail => "pipefail",
            ShellOption::Globstar => "globstar",
            ShellOption::Nullglob => "nullglob",
            ShellOption::Dotglob => "dotglob",
        }
    }

    /// Parse a long option name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "errexit" => ShellOption::Errexit,
            "nounset" => ShellOption::Nounset,
            "xtrace" => ShellOption::Xtrace,
            "noglob" => ShellOption::Noglob,
            "noclobber" => ShellOption::Noclobber,
            "pipefail" => ShellOption::Pipefail,
            "globstar" => ShellOption::Globstar,
            "nullglob" => ShellOption::Nullglob,
            "dotglob" => ShellOption::Dotglob,
            _ => return None,
        })
    }

    /// Whether the option belongs to `shopt` rather than `set -o`.
    pub fn is_shopt(self) -> bool {
        matches!(
            self,
            ShellOption::Globstar | ShellOption::Nullglob | ShellOption::Dotglob
        )
    }
}

impl fmt::Display for ShellOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of enabled shell options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOptions {
    enabled: BTreeSet<ShellOption>,
}

impl ShellOptions {
    /// All options off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether an option is on.
    pub fn is_set(&self, opt: ShellOption) -> bool {
        self.enabled.contains(&opt)
    }

    /// Turn an option on or off.
    pub fn set(&mut self, opt: ShellOption, on: bool) {
        if on {
            self.enabled.insert(opt);
        } else {
            self.enabled.remove(&opt);
        }
    }

    /// Builder-style enable, used by `ShellBuilder::option`.
    pub fn with(mut self, opt: ShellOption) -> Self {
        self.enabled.insert(opt);
        self
    }

    /// Iterate over enabled options.
    pub fn iter(&self) -> impl Iterator<Item = ShellOption> + '_ {
        self.enabled.iter().copied()
    }

    /// Value of `$-`: the enabled single-letter flags.
    pub fn flags_string(&self) -> String {
        self.enabled
            .iter()
            .filter_map(|opt| opt.short_flag())
            .collect()
    }
}
