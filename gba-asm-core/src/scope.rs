use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use gba_asm_expr::{Context, LookupResult, Mode, ResolvedPath, ResolvedSegment};
use gba_asm_types::{Reg, SourcePos, VirtAddr};

use crate::error::{CoreError, Result};
use crate::struct_layout::StructLayout;

/// Shared address slot for a label or `begin`-block, mutated by `flatten`
/// and cleared by `makeStart` (spec §3 "Def ... address slot").
pub type AddrSlot = Rc<RefCell<Option<VirtAddr>>>;

/// One named definition (spec §3 "Def").
#[derive(Debug, Clone)]
pub enum Def {
    Num(i64),
    Label(AddrSlot),
    Begin { scope: Rc<RefCell<DefMap>>, addr: AddrSlot },
    ImportAll { file: String },
    ImportName { file: String, symbol: String },
    /// A `const` captures the expression *and* the scope chain it was
    /// defined in, so referencing it later evaluates against the
    /// definition site, not the reference site.
    Const { expr: gba_asm_expr::Expr, scope: Rc<ScopeChain> },
    ScriptExport(i64),
    Struct(Rc<StructLayout>),
}

/// A lexical scope's flat name table (spec §3 "DefMap").
#[derive(Debug, Clone, Default)]
pub struct DefMap {
    entries: HashMap<String, Def>,
}

impl DefMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pos: &SourcePos, name: &str, def: Def) -> Result<()> {
        if self.entries.contains_key(name) {
            return Err(CoreError::Redefinition {
                pos: pos.clone(),
                name: name.to_string(),
            });
        }
        self.entries.insert(name.to_string(), def);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Def> {
        self.entries.get(name)
    }
}

/// One frame of the level stack (spec §3 "Level"). The stack bottom is the
/// file's default; `begin`/`end` push/pop frames, `if` pushes a
/// non-scope frame that only gates `active`.
#[derive(Debug, Clone)]
pub struct Level {
    pub active: bool,
    pub mode: Option<Mode>,
    pub reg_aliases: HashMap<String, Reg>,
    /// Whether entering this level pushed a fresh [`DefMap`] (`begin`) as
    /// opposed to only gating activity (`if`).
    pub is_scope: bool,
    /// Whether entering this level pushed a `.base` frame that must be
    /// auto-popped when the level ends, keeping base changes lexically
    /// scoped to the block that made them.
    pub shifted_base: bool,
}

impl Level {
    pub fn root() -> Self {
        Self {
            active: true,
            mode: None,
            reg_aliases: HashMap::new(),
            is_scope: true,
            shifted_base: false,
        }
    }
}

/// Reserved words that may never be redefined (spec §4.7 "Naming rules").
const RESERVED_WORDS: &[&str] = &[
    "if", "else", "begin", "end", "struct", "align", "pool", "include", "embed", "iwram", "ewram",
];

/// `true` for the GBA's default register spellings (`r0`..`r15`, `sp`,
/// `lr`, `pc`), which a program may alias to something else but never
/// redefine as an ordinary symbol.
fn is_default_register_name(name: &str) -> bool {
    if matches!(name, "sp" | "lr" | "pc") {
        return true;
    }
    name.strip_prefix('r')
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) && rest.parse::<u8>().map(|n| n < 16).unwrap_or(false))
        .unwrap_or(false)
}

fn check_definable(level: &Level, name: &str, pos: &SourcePos) -> Result<()> {
    if RESERVED_WORDS.contains(&name) {
        return Err(CoreError::ReservedWord {
            pos: pos.clone(),
            name: name.to_string(),
        });
    }
    if level.reg_aliases.contains_key(name) || is_default_register_name(name) {
        return Err(CoreError::RegisterNameCollision {
            pos: pos.clone(),
            name: name.to_string(),
        });
    }
    let mut chars = name.chars();
    if chars.next() == Some('_') {
        if let Some(c) = chars.next() {
            if c.is_ascii_lowercase() {
                return Err(CoreError::ReservedUnderscorePrefix {
                    pos: pos.clone(),
                    name: name.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Pending forward-label slots, keyed by name, in first-referenced order;
/// plus the permanent per-occurrence binding once a reference has claimed a
/// slot (spec §4.7 "Relative labels").
#[derive(Debug, Default)]
struct ForwardLabelTable {
    pending: HashMap<String, VecDeque<AddrSlot>>,
    claimed: HashMap<u64, AddrSlot>,
}

impl ForwardLabelTable {
    fn resolve(&mut self, name: &str, count: u32, use_id: u64) -> LookupResult {
        if let Some(slot) = self.claimed.get(&use_id) {
            return slot_lookup(slot);
        }
        let queue = self.pending.entry(name.to_string()).or_default();
        while queue.len() < count as usize {
            queue.push_back(Rc::new(RefCell::new(None)));
        }
        let slot = queue[count as usize - 1].clone();
        self.claimed.insert(use_id, slot.clone());
        slot_lookup(&slot)
    }

    fn define(&mut self, name: &str, addr: VirtAddr) {
        if let Some(queue) = self.pending.get_mut(name) {
            if let Some(slot) = queue.pop_front() {
                *slot.borrow_mut() = Some(addr);
            }
        }
    }
}

/// The reverse-label stack (spec §4.7, §9 "Observed quirks worth
/// flagging"). Each entry remembers the scope depth it was defined at so
/// `end()` can prune entries whose scope no longer exists.
#[derive(Debug, Default)]
struct ReverseLabelTable {
    stack: Vec<(String, AddrSlot, usize)>,
}

impl ReverseLabelTable {
    fn define(&mut self, name: &str, slot: AddrSlot, depth: usize) {
        self.stack.push((name.to_string(), slot, depth));
    }

    fn resolve(&self, name: &str, count: u32) -> LookupResult {
        let mut seen = 0u32;
        for (n, slot, _) in self.stack.iter().rev() {
            if n == name {
                seen += 1;
                if seen == count {
                    return slot_lookup(slot);
                }
            }
        }
        LookupResult::NotFound
    }

    /// Reproduces the spec's literal quirk: prune any reverse labels whose
    /// recorded scope depth no longer exists once `end()` has popped back
    /// to `new_depth`.
    fn prune(&mut self, new_depth: usize) {
        self.stack.retain(|(_, _, depth)| *depth <= new_depth);
    }
}

fn slot_lookup(slot: &AddrSlot) -> LookupResult {
    match *slot.borrow() {
        Some(a) => LookupResult::Found(a.0 as i64),
        None => LookupResult::Unresolved,
    }
}

/// The full scope chain for one Import: the root table, the level stack,
/// and the relative-label tables (spec §3 "Import" fields: "root definition
/// table; scope chain; level stack").
///
/// A `Rc<RefCell<...>>`-backed snapshot of this is what gets captured by a
/// pending write (spec §9 "Scope-snapshot for deferred resolution") — older
/// frames are never mutated once popped (they live on inside their
/// `Def::Begin` entry), so cloning the `Rc` is enough; no deep copy needed.
/// A file-to-symbol forwarder installed by the Project once every reachable
/// Import has been discovered and parsed (spec §4.10): given the filename an
/// `importAll`/`importName` def names and the path beyond it, looks that
/// path up in the named Import's own root table. `None` until the Project
/// installs one — during parsing and the early `endOfFile` sweep no other
/// Import is guaranteed to exist yet, so a lookup through an unset resolver
/// stays `Unresolved` rather than failing outright.
pub type ImportResolver = Rc<dyn Fn(&str, &ResolvedPath) -> LookupResult>;

#[derive(Debug)]
pub struct ScopeChain {
    pub root: Rc<RefCell<DefMap>>,
    /// Frames from root-adjacent to innermost, parallel to `levels`.
    pub frames: RefCell<Vec<Rc<RefCell<DefMap>>>>,
    pub levels: RefCell<Vec<Level>>,
    forward: RefCell<ForwardLabelTable>,
    reverse: RefCell<ReverseLabelTable>,
    cross_file: RefCell<Option<ImportResolver>>,
}

impl ScopeChain {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            root: Rc::new(RefCell::new(DefMap::new())),
            frames: RefCell::new(vec![]),
            levels: RefCell::new(vec![Level::root()]),
            forward: RefCell::new(ForwardLabelTable::default()),
            reverse: RefCell::new(ReverseLabelTable::default()),
            cross_file: RefCell::new(None),
        })
    }

    /// Wires up cross-file symbol forwarding (spec §4.10 "Project ...
    /// include/import orchestration"). Installed once per Import by the
    /// Project after every reachable file has been parsed and cached.
    pub fn set_import_resolver(&self, resolver: ImportResolver) {
        *self.cross_file.borrow_mut() = Some(resolver);
    }

    pub fn current_mode(&self) -> Option<Mode> {
        self.levels.borrow().iter().rev().find_map(|l| l.mode)
    }

    pub fn current_reg_aliases(&self) -> HashMap<String, Reg> {
        let mut merged = HashMap::new();
        for level in self.levels.borrow().iter() {
            merged.extend(level.reg_aliases.clone());
        }
        merged
    }

    /// `setMode` (spec §6): sets the current level's instruction-decoding
    /// mode, in effect until the level ends.
    pub fn set_mode(&self, mode: Mode) {
        self.levels.borrow_mut().last_mut().expect("level stack is never empty").mode = Some(mode);
    }

    /// `setRegs` (spec §6): aliases `name` to `reg` for the rest of the
    /// current level.
    pub fn set_reg_alias(&self, name: &str, reg: Reg) {
        self.levels
            .borrow_mut()
            .last_mut()
            .expect("level stack is never empty")
            .reg_aliases
            .insert(name.to_string(), reg);
    }

    /// Marks the current level as having pushed a `.base` frame, so `end()`
    /// knows to pop the base stack along with the scope (spec §4.6: base
    /// changes nest lexically with the block that made them).
    pub fn mark_shifted_base(&self) {
        self.levels.borrow_mut().last_mut().expect("level stack is never empty").shifted_base = true;
    }

    /// Whether the top level pushed a base frame needing an auto-pop; used
    /// by `Import::end` before delegating to `end()`.
    pub fn top_shifted_base(&self) -> bool {
        self.levels.borrow().last().expect("level stack is never empty").shifted_base
    }

    pub fn is_active(&self) -> bool {
        self.levels.borrow().iter().all(|l| l.active)
    }

    pub fn begin(&self, name: Option<&str>, pos: &SourcePos) -> Result<AddrSlot> {
        let addr = Rc::new(RefCell::new(None));
        let scope = Rc::new(RefCell::new(DefMap::new()));
        if let Some(name) = name {
            self.insert_top(pos, name, Def::Begin { scope: scope.clone(), addr: addr.clone() })?;
        }
        self.frames.borrow_mut().push(scope);
        self.levels.borrow_mut().push(Level {
            active: true,
            mode: self.current_mode(),
            reg_aliases: HashMap::new(),
            is_scope: true,
            shifted_base: false,
        });
        Ok(addr)
    }

    pub fn if_start(&self, active: bool) {
        let parent_active = self.is_active();
        self.levels.borrow_mut().push(Level {
            active: parent_active && active,
            mode: self.current_mode(),
            reg_aliases: HashMap::new(),
            is_scope: false,
            shifted_base: false,
        });
    }

    /// Pops the top level (and its scope frame, if it had one); applies the
    /// reverse-label pruning quirk from spec §9.
    pub fn end(&self) {
        let popped = self.levels.borrow_mut().pop();
        if let Some(level) = popped {
            if level.is_scope {
                self.frames.borrow_mut().pop();
            }
        }
        let new_depth = self.levels.borrow().len();
        self.reverse.borrow_mut().prune(new_depth);
    }

    fn insert_top(&self, pos: &SourcePos, name: &str, def: Def) -> Result<()> {
        let top = self.frames.borrow();
        let level = self.levels.borrow();
        let level = level.last().expect("level stack is never empty");
        check_definable(level, name, pos)?;
        match top.last() {
            Some(frame) => frame.borrow_mut().insert(pos, name, def),
            None => self.root.borrow_mut().insert(pos, name, def),
        }
    }

    pub fn define_num(&self, pos: &SourcePos, name: &str, value: i64) -> Result<()> {
        self.insert_top(pos, name, Def::Num(value))
    }

    pub fn define_const(&self, pos: &SourcePos, name: &str, expr: gba_asm_expr::Expr, scope: Rc<ScopeChain>) -> Result<()> {
        self.insert_top(pos, name, Def::Const { expr, scope })
    }

    pub fn define_import_all(&self, pos: &SourcePos, name: &str, file: &str) -> Result<()> {
        self.insert_top(pos, name, Def::ImportAll { file: file.to_string() })
    }

    pub fn define_import_name(&self, pos: &SourcePos, name: &str, file: &str, symbol: &str) -> Result<()> {
        self.insert_top(
            pos,
            name,
            Def::ImportName {
                file: file.to_string(),
                symbol: symbol.to_string(),
            },
        )
    }

    pub fn define_struct(&self, pos: &SourcePos, name: &str, layout: StructLayout) -> Result<()> {
        self.insert_top(pos, name, Def::Struct(Rc::new(layout)))
    }

    /// Declares a named label, returning its address slot. Also registers
    /// it with the reverse-label table if `name` is one of the relative
    /// marker forms (spec expects the parser to have already stripped any
    /// leading `+`; plain reverse markers `-`, `--`, … are names in their
    /// own right here).
    pub fn define_label(&self, pos: &SourcePos, name: &str) -> Result<AddrSlot> {
        let slot = Rc::new(RefCell::new(None));
        self.insert_top(pos, name, Def::Label(slot.clone()))?;
        let depth = self.levels.borrow().len();
        self.reverse.borrow_mut().define(name, slot.clone(), depth);
        Ok(slot)
    }

    /// Notifies the forward-label table once a label's address slot is
    /// actually filled in (called after `flatten`, not at definition time,
    /// since the address isn't known until then).
    pub fn notify_label_addr(&self, name: &str, addr: VirtAddr) {
        self.forward.borrow_mut().define(name, addr);
    }

    pub fn reverse_label(&self, name: &str, count: u32) -> LookupResult {
        self.reverse.borrow().resolve(name, count)
    }

    pub fn forward_label(&self, name: &str, count: u32, use_id: u64) -> LookupResult {
        self.forward.borrow_mut().resolve(name, count, use_id)
    }

    /// Looks up a struct-typed definition by name, for callers that need the
    /// full layout (member offsets, array lengths) rather than the bare
    /// `sizeof` a plain [`Self::lookup`] collapses it to (spec §4.8 "Member
    /// lookup"). Used by the typed-memory operand resolver to turn a
    /// `Struct.member` path into a concrete offset before a load/store ever
    /// becomes a pending write.
    pub fn lookup_struct(&self, name: &str) -> Option<Rc<StructLayout>> {
        for frame in self.frames.borrow().iter().rev() {
            if let Some(Def::Struct(layout)) = frame.borrow().get(name) {
                return Some(layout.clone());
            }
        }
        match self.root.borrow().get(name) {
            Some(Def::Struct(layout)) => Some(layout.clone()),
            _ => None,
        }
    }

    /// Walks the scope stack outward (innermost first), per spec §4.7.
    pub fn lookup(&self, path: &ResolvedPath) -> LookupResult {
        let ResolvedSegment::Name(head) = &path.0[0] else {
            return LookupResult::NotFound;
        };
        for frame in self.frames.borrow().iter().rev() {
            if let Some(def) = frame.borrow().get(head) {
                return self.lookup_def(def, &path.0[1..]);
            }
        }
        if let Some(def) = self.root.borrow().get(head) {
            return self.lookup_def(def, &path.0[1..]);
        }
        LookupResult::NotFound
    }

    fn lookup_def(&self, def: &Def, rest: &[ResolvedSegment]) -> LookupResult {
        match def {
            Def::Num(n) if rest.is_empty() => LookupResult::Found(*n),
            Def::Num(_) => LookupResult::NotFound,
            Def::Label(slot) if rest.is_empty() => slot_lookup(slot),
            Def::Label(_) => LookupResult::NotFound,
            Def::Begin { scope, addr } => {
                if rest.is_empty() {
                    return slot_lookup(addr);
                }
                let ResolvedSegment::Name(name) = &rest[0] else {
                    return LookupResult::NotFound;
                };
                match scope.borrow().get(name) {
                    Some(nested) => self.lookup_def(nested, &rest[1..]),
                    None => LookupResult::NotFound,
                }
            }
            Def::ScriptExport(n) if rest.is_empty() => LookupResult::Found(*n),
            Def::ScriptExport(_) => LookupResult::NotFound,
            Def::Struct(layout) => layout.lookup_member(rest),
            // importAll/importName forward into another Import's root table.
            // Resolving that needs the Project's file cache, wired in after
            // every reachable file is parsed — see `set_import_resolver`.
            Def::ImportAll { file } => {
                if rest.is_empty() {
                    return LookupResult::NotFound;
                }
                match &*self.cross_file.borrow() {
                    Some(resolver) => resolver(file, &ResolvedPath(rest.to_vec())),
                    None => LookupResult::Unresolved,
                }
            }
            Def::ImportName { file, symbol } => {
                if !rest.is_empty() {
                    return LookupResult::NotFound;
                }
                match &*self.cross_file.borrow() {
                    Some(resolver) => resolver(file, &ResolvedPath(vec![ResolvedSegment::Name(symbol.clone())])),
                    None => LookupResult::Unresolved,
                }
            }
            Def::Const { expr, scope } => {
                if !rest.is_empty() {
                    return LookupResult::NotFound;
                }
                let ctx = PendingContext {
                    scope,
                    own_addr: None,
                };
                match gba_asm_expr::value(expr, &ctx, false, &SourcePos::synthetic("const")) {
                    Ok(gba_asm_expr::ExprValue::Resolved(n)) => LookupResult::Found(n),
                    Ok(gba_asm_expr::ExprValue::Unresolved) => LookupResult::Unresolved,
                    Err(_) => LookupResult::NotFound,
                }
            }
        }
    }
}

/// The [`Context`] implementation handed to [`gba_asm_expr::value`] for a
/// pending write, built fresh at each resolution attempt: `scope` is the
/// snapshot captured when the write was queued; `own_addr` is the owning
/// rewrite slot's resolved address, if any (spec §6 "Expression-layer
/// contract").
pub struct PendingContext<'a> {
    pub scope: &'a Rc<ScopeChain>,
    pub own_addr: Option<VirtAddr>,
}

impl<'a> Context for PendingContext<'a> {
    fn lookup(&self, path: &ResolvedPath) -> LookupResult {
        self.scope.lookup(path)
    }

    fn reverse_label(&self, name: &str, count: u32) -> LookupResult {
        self.scope.reverse_label(name, count)
    }

    fn forward_label(&self, name: &str, count: u32, use_id: u64) -> LookupResult {
        self.scope.forward_label(name, count, use_id)
    }

    fn current_addr(&self) -> LookupResult {
        match self.own_addr {
            Some(a) => LookupResult::Found(a.0 as i64),
            None => LookupResult::Unresolved,
        }
    }

    fn mode(&self) -> Option<Mode> {
        self.scope.current_mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_resolves_once_its_slot_is_filled() {
        let chain = ScopeChain::new();
        let pos = SourcePos::synthetic("t");
        let slot = chain.define_label(&pos, "start").unwrap();
        let path = ResolvedPath(vec![ResolvedSegment::Name("start".to_string())]);
        assert_eq!(chain.lookup(&path), LookupResult::Unresolved);
        *slot.borrow_mut() = Some(VirtAddr::new(0x0800_0000));
        assert_eq!(chain.lookup(&path), LookupResult::Found(0x0800_0000));
    }

    #[test]
    fn redefinition_in_same_scope_is_rejected() {
        let chain = ScopeChain::new();
        let pos = SourcePos::synthetic("t");
        chain.define_num(&pos, "foo", 1).unwrap();
        assert!(matches!(
            chain.define_num(&pos, "foo", 2),
            Err(CoreError::Redefinition { .. })
        ));
    }

    #[test]
    fn nested_scope_shadows_outer_name() {
        let chain = ScopeChain::new();
        let pos = SourcePos::synthetic("t");
        chain.define_num(&pos, "x", 1).unwrap();
        chain.begin(None, &pos).unwrap();
        chain.define_num(&pos, "x", 2).unwrap();
        let path = ResolvedPath(vec![ResolvedSegment::Name("x".to_string())]);
        assert_eq!(chain.lookup(&path), LookupResult::Found(2));
        chain.end();
        assert_eq!(chain.lookup(&path), LookupResult::Found(1));
    }

    #[test]
    fn reverse_label_finds_nearest_preceding_match() {
        // A name is only `insert`ed once per scope frame, so two same-named
        // labels only coexist via shadowing in a nested `begin` — the usual
        // case for a reused loop label inside a repeated block.
        let chain = ScopeChain::new();
        let pos = SourcePos::synthetic("t");
        let s1 = chain.define_label(&pos, "loop").unwrap();
        *s1.borrow_mut() = Some(VirtAddr::new(0x100));
        chain.begin(None, &pos).unwrap();
        let s2 = chain.define_label(&pos, "loop").unwrap();
        *s2.borrow_mut() = Some(VirtAddr::new(0x200));
        assert_eq!(chain.reverse_label("loop", 1), LookupResult::Found(0x200));
        assert_eq!(chain.reverse_label("loop", 2), LookupResult::Found(0x100));
    }

    #[test]
    fn forward_label_same_use_id_keeps_resolving_to_same_target() {
        let chain = ScopeChain::new();
        let pos = SourcePos::synthetic("t");
        assert_eq!(chain.forward_label("far", 1, 42), LookupResult::Unresolved);
        let slot = chain.define_label(&pos, "far").unwrap();
        *slot.borrow_mut() = Some(VirtAddr::new(0x300));
        chain.notify_label_addr("far", VirtAddr::new(0x300));
        assert_eq!(chain.forward_label("far", 1, 42), LookupResult::Found(0x300));
    }

    #[test]
    fn reserved_word_cannot_be_defined() {
        let chain = ScopeChain::new();
        let pos = SourcePos::synthetic("t");
        assert!(matches!(
            chain.define_num(&pos, "struct", 1),
            Err(CoreError::ReservedWord { .. })
        ));
    }

    #[test]
    fn import_all_forwards_through_installed_resolver() {
        let importer = ScopeChain::new();
        let pos = SourcePos::synthetic("t");
        importer.define_import_all(&pos, "other", "other.s").unwrap();
        let path = ResolvedPath(vec![ResolvedSegment::Name("other".to_string()), ResolvedSegment::Name("value".to_string())]);

        // unresolved until the Project installs a resolver
        assert_eq!(importer.lookup(&path), LookupResult::Unresolved);

        importer.set_import_resolver(Rc::new(|file, path| {
            assert_eq!(file, "other.s");
            assert_eq!(path.0.len(), 1);
            LookupResult::Found(7)
        }));
        assert_eq!(importer.lookup(&path), LookupResult::Found(7));
    }

    #[test]
    fn underscore_lowercase_prefix_is_reserved() {
        let chain = ScopeChain::new();
        let pos = SourcePos::synthetic("t");
        assert!(matches!(
            chain.define_num(&pos, "_internal", 1),
            Err(CoreError::ReservedUnderscorePrefix { .. })
        ));
        // an underscore followed by an uppercase letter or digit is fine
        chain.define_num(&pos, "_Internal", 1).unwrap();
    }
}
