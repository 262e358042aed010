//! Register name resolution: the fixed `r0`..`r15` spellings plus the ARM
//! ABI aliases every gbadev dialect accepts (`sp`/`lr`/`pc`), layered under
//! whatever per-file aliases `.regs` has installed.

use gba_asm_types::Reg;

/// Resolves a bare register spelling against the fixed table only — used
/// before a file's `.regs` aliases are consulted, and for validating a
/// `.regs` directive's own right-hand side.
pub fn builtin(name: &str) -> Option<Reg> {
    match name {
        "sp" => Some(Reg::SP),
        "lr" => Some(Reg::LR),
        "pc" => Some(Reg::PC),
        _ => {
            let digits = name.strip_prefix('r')?;
            let n: u8 = digits.parse().ok()?;
            (n <= 15).then_some(Reg(n))
        }
    }
}

/// Resolves `name` against both the builtin table and `aliases`, the way a
/// statement operand sees it after `.regs` has run. Builtin spellings take
/// priority, matching `Import::set_regs`'s own `ReservedWord`/
/// `RegisterNameCollision` guard against shadowing them.
pub fn resolve(name: &str, aliases: &std::collections::HashMap<String, Reg>) -> Option<Reg> {
    builtin(name).or_else(|| aliases.get(name).copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_abi_names_resolve() {
        assert_eq!(builtin("r0"), Some(Reg(0)));
        assert_eq!(builtin("r15"), Some(Reg(15)));
        assert_eq!(builtin("sp"), Some(Reg::SP));
        assert_eq!(builtin("lr"), Some(Reg::LR));
        assert_eq!(builtin("pc"), Some(Reg::PC));
    }

    #[test]
    fn out_of_range_or_garbage_rejected() {
        assert_eq!(builtin("r16"), None);
        assert_eq!(builtin("rX"), None);
        assert_eq!(builtin("banana"), None);
    }
}
