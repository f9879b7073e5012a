//! Shell variables, arrays and positional parameters
//!
//! A name holds exactly one kind of value at a time: scalar, indexed array
//! or associative array. Declaring a name as another kind replaces the old
//! value.

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::expand::arithmetic::ArithmeticContext;

/// What kind of value a variable holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Scalar,
    Indexed,
    Associative,
}

/// Variable storage for one shell.
#[derive(Debug, Clone)]
pub struct Environment {
    vars: HashMap<String, String>,
    /// Indexed arrays, sparse: unassigned indices hold nothing.
    arrays: HashMap<String, BTreeMap<usize, String>>,
    assoc: HashMap<String, BTreeMap<String, String>>,
    kinds: HashMap<String, VarKind>,
    exported: HashSet<String>,
    positional: Vec<String>,
    script_name: String,
    /// Names declared `local` in each active function call
    local_frames: Vec<HashSet<String>>,
    rng: StdRng,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Saved caller state for one function call.
#[derive(Debug)]
pub struct FunctionScope {
    vars: HashMap<String, String>,
    arrays: HashMap<String, BTreeMap<usize, String>>,
    assoc: HashMap<String, BTreeMap<String, String>>,
    kinds: HashMap<String, VarKind>,
    exported: HashSet<String>,
    positional: Vec<String>,
    script_name: String,
}

impl Environment {
    /// Empty environment.
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
            arrays: HashMap::new(),
            assoc: HashMap::new(),
            kinds: HashMap::new(),
            exported: HashSet::new(),
            positional: Vec::new(),
            script_name: "tidesh".to_string(),
            local_frames: Vec::new(),
            rng: StdRng::from_os_rng(),
        }
    }

    /// Environment seeded from this process's environment, all exported.
    pub fn from_process_env() -> Self {
        let mut env = Self::new();
        for (name, value) in std::env::vars() {
            env.set(&name, value);
            env.exported.insert(name);
        }
        env
    }

    /// Kind of value stored under `name`, if set.
    pub fn kind(&self, name: &str) -> Option<VarKind> {
        self.kinds.get(name).copied()
    }

    /// Whether `name` holds any value.
    pub fn is_set(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Scalar value. Arrays yield element `0`.
    pub fn get(&self, name: &str) -> Option<String> {
        match self.kind(name)? {
            VarKind::Scalar => self.vars.get(name).cloned(),
            VarKind::Indexed => self.arrays.get(name)?.get(&0).cloned(),
            VarKind::Associative => self.assoc.get(name)?.get("0").cloned(),
        }
    }

    /// Assign a scalar. On an array this assigns element `0`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.kind(name) {
            Some(VarKind::Indexed) => self.set_element(name, 0, value),
            Some(VarKind::Associative) => self.set_assoc_element(name, "0", value),
            _ => {
                self.vars.insert(name.to_string(), value);
                self.kinds.insert(name.to_string(), VarKind::Scalar);
            }
        }
    }

    /// `name+=value` on a scalar.
    pub fn append(&mut self, name: &str, value: &str) {
        let current = self.get(name).unwrap_or_default();
        self.set(name, current + value);
    }

    /// Remove a variable of any kind.
    pub fn unset(&mut self, name: &str) {
        self.vars.remove(name);
        self.arrays.remove(name);
        self.assoc.remove(name);
        self.kinds.remove(name);
        self.exported.remove(name);
    }

    fn clear_value(&mut self, name: &str) {
        self.vars.remove(name);
        self.arrays.remove(name);
        self.assoc.remove(name);
    }

    /// Replace `name` with an indexed array numbered from `0`.
    pub fn set_array(&mut self, name: &str, values: Vec<String>) {
        self.set_indexed(name, values.into_iter().enumerate().collect());
    }

    /// Replace `name` with an indexed array holding exactly `elements`.
    pub fn set_indexed(&mut self, name: &str, elements: BTreeMap<usize, String>) {
        self.clear_value(name);
        self.arrays.insert(name.to_string(), elements);
        self.kinds.insert(name.to_string(), VarKind::Indexed);
    }

    /// Assigned elements of an indexed array by index.
    pub fn indexed(&self, name: &str) -> BTreeMap<usize, String> {
        match self.kind(name) {
            Some(VarKind::Indexed) => self.arrays.get(name).cloned().unwrap_or_default(),
            Some(VarKind::Scalar) => self.vars.get(name).cloned().map(|v| (0, v)).into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }

    /// One past the highest assigned index. Negative subscripts and `a+=(...)`
    /// count from here.
    pub fn array_end(&self, name: &str) -> usize {
        match self.kind(name) {
            Some(VarKind::Indexed) => self
                .arrays
                .get(name)
                .and_then(|a| a.keys().next_back())
                .map_or(0, |last| last.saturating_add(1)),
            Some(VarKind::Scalar) => 1,
            _ => 0,
        }
    }

    /// Index named by subscript `index`; negative values count back from
    /// [`array_end`](Self::array_end). `None` if that lands before `0`.
    pub fn resolve_index(&self, name: &str, index: i64) -> Option<usize> {
        if index >= 0 {
            return usize::try_from(index).ok();
        }
        let back = usize::try_from(index.unsigned_abs()).ok()?;
        self.array_end(name).checked_sub(back)
    }

    /// Replace `name` with an associative array.
    pub fn set_assoc(&mut self, name: &str, values: BTreeMap<String, String>) {
        self.clear_value(name);
        self.assoc.insert(name.to_string(), values);
        self.kinds.insert(name.to_string(), VarKind::Associative);
    }

    /// `declare -a name`: keep a scalar value as element `0`.
    pub fn declare_indexed(&mut self, name: &str) {
        match self.kind(name) {
            Some(VarKind::Indexed) => {}
            Some(VarKind::Scalar) => {
                let value = self.vars.get(name).cloned().unwrap_or_default();
                self.set_array(name, vec![value]);
            }
            _ => self.set_array(name, Vec::new()),
        }
    }

    /// `declare -A name`
    pub fn declare_associative(&mut self, name: &str) {
        if self.kind(name) != Some(VarKind::Associative) {
            self.set_assoc(name, BTreeMap::new());
        }
    }

    /// Assign `name[index]`, turning a scalar into an array.
    pub fn set_element(&mut self, name: &str, index: usize, value: impl Into<String>) {
        let value = value.into();
        if self.kind(name) == Some(VarKind::Associative) {
            self.set_assoc_element(name, &index.to_string(), value);
            return;
        }
        if self.kind(name) != Some(VarKind::Indexed) {
            self.declare_indexed(name);
        }
        self.arrays.entry(name.to_string()).or_default().insert(index, value);
    }

    /// Value of `name[index]`. A scalar is element `0`.
    pub fn get_element(&self, name: &str, index: usize) -> Option<String> {
        match self.kind(name)? {
            VarKind::Indexed => self.arrays.get(name)?.get(&index).cloned(),
            VarKind::Associative => self.assoc.get(name)?.get(&index.to_string()).cloned(),
            VarKind::Scalar => (index == 0).then(|| self.vars.get(name).cloned()).flatten(),
        }
    }

    /// Assign `name[key]` in an associative array.
    pub fn set_assoc_element(&mut self, name: &str, key: &str, value: impl Into<String>) {
        if self.kind(name) != Some(VarKind::Associative) {
            self.set_assoc(name, BTreeMap::new());
        }
        self.assoc
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Value of `name[key]` in an associative array.
    pub fn get_assoc_element(&self, name: &str, key: &str) -> Option<String> {
        self.assoc.get(name)?.get(key).cloned()
    }

    /// Remove one element. Other indices are unchanged.
    pub fn unset_element(&mut self, name: &str, key: &str) {
        match self.kind(name) {
            Some(VarKind::Associative) => {
                if let Some(map) = self.assoc.get_mut(name) {
                    map.remove(key);
                }
            }
            Some(VarKind::Indexed) => {
                if let (Some(array), Ok(index)) = (self.arrays.get_mut(name), key.parse::<usize>()) {
                    array.remove(&index);
                }
            }
            _ => {}
        }
    }

    /// All values of `name`: array elements, or the scalar alone.
    pub fn values(&self, name: &str) -> Vec<String> {
        match self.kind(name) {
            Some(VarKind::Indexed) => self
                .arrays
                .get(name)
                .map(|a| a.values().cloned().collect())
                .unwrap_or_default(),
            Some(VarKind::Associative) => self
                .assoc
                .get(name)
                .map(|m| m.values().cloned().collect())
                .unwrap_or_default(),
            Some(VarKind::Scalar) => self.vars.get(name).cloned().into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Keys of `name`: indices for indexed arrays, keys for associative ones.
    pub fn keys(&self, name: &str) -> Vec<String> {
        match self.kind(name) {
            Some(VarKind::Indexed) => self
                .arrays
                .get(name)
                .map(|a| a.keys().map(|i| i.to_string()).collect())
                .unwrap_or_default(),
            Some(VarKind::Associative) => self
                .assoc
                .get(name)
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default(),
            Some(VarKind::Scalar) => vec!["0".to_string()],
            None => Vec::new(),
        }
    }

    /// Mark a variable for export to child processes.
    pub fn export(&mut self, name: &str) {
        self.exported.insert(name.to_string());
    }

    /// Whether `name` is exported.
    pub fn is_exported(&self, name: &str) -> bool {
        self.exported.contains(name)
    }

    /// Name/value pairs passed to child processes, sorted by name.
    pub fn exported_vars(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .exported
            .iter()
            .filter_map(|name| self.get(name).map(|value| (name.clone(), value)))
            .collect();
        out.sort();
        out
    }

    /// Every scalar-visible variable as name/value pairs, sorted by name.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.kinds
            .keys()
            .filter_map(|name| self.get(name).map(|value| (name.clone(), value)))
            .collect()
    }

    /// `$1..$N`
    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    /// Replace `$1..$N`.
    pub fn set_positional(&mut self, args: Vec<String>) {
        self.positional = args;
    }

    /// Drop the first `n` positional parameters. False if there are fewer.
    pub fn shift(&mut self, n: usize) -> bool {
        if n > self.positional.len() {
            return false;
        }
        self.positional.drain(..n);
        true
    }

    /// `$0`
    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    /// Set `$0`.
    pub fn set_script_name(&mut self, name: impl Into<String>) {
        self.script_name = name.into();
    }

    /// Whether a function call is active.
    pub fn in_function(&self) -> bool {
        !self.local_frames.is_empty()
    }

    /// `local name`: the name is removed when the current call returns.
    /// Returns false outside a function.
    pub fn declare_local(&mut self, name: &str) -> bool {
        match self.local_frames.last_mut() {
            Some(frame) => {
                frame.insert(name.to_string());
                true
            }
            None => false,
        }
    }

    /// Start a function call: save the caller's variables, bind the call's
    /// arguments to `$1..$N` and its name to `$0`.
    pub fn enter_function(&mut self, name: &str, args: Vec<String>) -> FunctionScope {
        let scope = FunctionScope {
            vars: self.vars.clone(),
            arrays: self.arrays.clone(),
            assoc: self.assoc.clone(),
            kinds: self.kinds.clone(),
            exported: self.exported.clone(),
            positional: std::mem::replace(&mut self.positional, args),
            script_name: std::mem::replace(&mut self.script_name, name.to_string()),
        };
        self.local_frames.push(HashSet::new());
        scope
    }

    /// Finish a function call.
    ///
    /// Every name that existed before the call gets its saved value back.
    /// Names first created inside the call stay visible to the caller unless
    /// they were declared `local`.
    pub fn leave_function(&mut self, scope: FunctionScope) {
        let locals = self.local_frames.pop().unwrap_or_default();
        let names: HashSet<String> = self.kinds.keys().chain(scope.kinds.keys()).cloned().collect();

        for name in names {
            match scope.kinds.get(&name) {
                Some(kind) => {
                    self.clear_value(&name);
                    self.kinds.insert(name.clone(), *kind);
                    if let Some(v) = scope.vars.get(&name) {
                        self.vars.insert(name.clone(), v.clone());
                    }
                    if let Some(v) = scope.arrays.get(&name) {
                        self.arrays.insert(name.clone(), v.clone());
                    }
                    if let Some(v) = scope.assoc.get(&name) {
                        self.assoc.insert(name.clone(), v.clone());
                    }
                    if scope.exported.contains(&name) {
                        self.exported.insert(name);
                    } else {
                        self.exported.remove(&name);
                    }
                }
                None if locals.contains(&name) => self.unset(&name),
                None => {}
            }
        }
        self.positional = scope.positional;
        self.script_name = scope.script_name;
    }

    /// Reseed `$RANDOM` and `rand()`.
    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Next value of `$RANDOM` in `0..=32767`.
    pub fn next_random(&mut self) -> i64 {
        self.rng.random_range(0..=32767)
    }
}

impl ArithmeticContext for Environment {
    fn get_var(&self, name: &str) -> Option<String> {
        self.get(name)
    }

    fn set_var(&mut self, name: &str, value: String) {
        self.set(name, value);
    }

    fn get_element(&self, name: &str, index: i64) -> Option<String> {
        let index = usize::try_from(index).ok()?;
        Environment::get_element(self, name, index)
    }

    fn set_element(&mut self, name: &str, index: i64, value: String) {
        if let Ok(index) = usize::try_from(index) {
            Environment::set_element(self, name, index, value);
        }
    }

    fn random(&mut self) -> i64 {
        self.next_random()
    }

    fn seed_random(&mut self, seed: u64) {
        self.seed(seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip() {
        let mut env = Environment::new();
        assert!(!env.is_set("X"));
        env.set("X", "1");
        assert_eq!(env.get("X").as_deref(), Some("1"));
        env.append("X", "2");
        assert_eq!(env.get("X").as_deref(), Some("12"));
        env.unset("X");
        assert_eq!(env.get("X"), None);
    }

    #[test]
    fn test_last_declaration_wins() {
        let mut env = Environment::new();
        env.set("v", "scalar");
        env.set_array("v", vec!["a".into(), "b".into()]);
        assert_eq!(env.kind("v"), Some(VarKind::Indexed));
        assert_eq!(env.get("v").as_deref(), Some("a"));
        env.declare_associative("v");
        assert_eq!(env.kind("v"), Some(VarKind::Associative));
        assert!(env.values("v").is_empty());
    }

    #[test]
    fn test_sparse_assignment() {
        let mut env = Environment::new();
        env.set_element("a", 3, "x");
        env.set_element("a", usize::MAX - 1, "far");
        assert_eq!(env.values("a"), vec!["x", "far"]);
        assert_eq!(env.keys("a"), vec!["3".to_string(), (usize::MAX - 1).to_string()]);
        assert_eq!(env.array_end("a"), usize::MAX);
        assert_eq!(env.resolve_index("a", -1), Some(usize::MAX - 1));
        assert_eq!(env.resolve_index("a", i64::MIN), Some(usize::MAX - (1 << 63)));
        assert_eq!(env.get("a"), None);
        env.set_array("b", vec!["x".into()]);
        assert_eq!(env.resolve_index("b", -2), None);
    }

    #[test]
    fn test_scalar_becomes_array_on_element_assignment() {
        let mut env = Environment::new();
        env.set("s", "first");
        env.set_element("s", 1, "second");
        assert_eq!(env.values("s"), vec!["first", "second"]);
    }

    #[test]
    fn test_function_scope_restores_existing_and_leaks_new() {
        let mut env = Environment::new();
        env.set("existing", "before");
        env.set_positional(vec!["outer".into()]);

        let scope = env.enter_function("f", vec!["inner".into()]);
        assert_eq!(env.positional(), ["inner".to_string()]);
        assert_eq!(env.script_name(), "f");
        env.set("existing", "changed");
        env.set("created", "new");
        env.set("temp", "gone");
        assert!(env.declare_local("temp"));
        env.leave_function(scope);

        assert_eq!(env.get("existing").as_deref(), Some("before"));
        assert_eq!(env.get("created").as_deref(), Some("new"));
        assert_eq!(env.get("temp"), None);
        assert_eq!(env.positional(), ["outer".to_string()]);
        assert_eq!(env.script_name(), "tidesh");
    }

    #[test]
    fn test_function_scope_restores_unset_globals() {
        let mut env = Environment::new();
        env.set("keep", "v");
        let scope = env.enter_function("f", Vec::new());
        env.unset("keep");
        env.leave_function(scope);
        assert_eq!(env.get("keep").as_deref(), Some("v"));
    }

    #[test]
    fn test_local_outside_function() {
        let mut env = Environment::new();
        assert!(!env.declare_local("x"));
    }

    #[test]
    fn test_exported_vars() {
        let mut env = Environment::new();
        env.set("A", "1");
        env.set("B", "2");
        env.export("B");
        assert_eq!(env.exported_vars(), vec![("B".to_string(), "2".to_string())]);
    }

    #[test]
    fn test_shift() {
        let mut env = Environment::new();
        env.set_positional(vec!["a".into(), "b".into()]);
        assert!(env.shift(1));
        assert_eq!(env.positional(), ["b".to_string()]);
        assert!(!env.shift(2));
    }

    #[test]
    fn test_seeded_random_is_repeatable() {
        let mut a = Environment::new();
        let mut b = Environment::new();
        a.seed(7);
        b.seed(7);
        let xs: Vec<i64> = (0..5).map(|_| a.next_random()).collect();
        let ys: Vec<i64> = (0..5).map(|_| b.next_random()).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().all(|v| (0..=32767).contains(v)));
    }

    #[test]
    fn test_unset_element() {
        let mut env = Environment::new();
        env.set_array("a", vec!["x".into(), "y".into(), "z".into()]);
        env.unset_element("a", "1");
        assert_eq!(env.values("a"), vec!["x", "z"]);
        assert_eq!(env.keys("a"), vec!["0", "2"]);
        assert_eq!(env.array_end("a"), 3);
    }
}
