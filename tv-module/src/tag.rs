//! `ModuleTag`, grounded on `ModuleWrapper::Tag` in `module_wrapper.hh`,
//! expressed with `bitflags!` the way capability/status bitsets are modeled
//! elsewhere in this codebase.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ModuleTag: u32 {
        const EXEC_AND_REMOVE = 0x01;
        const EXEC_AND_DISABLE = 0x02;
        /// Monotonic: once set, the scheduler never clears it.
        const REMOVABLE = 0x04;
        const SEQUENTIAL = 0x08;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_compose() {
        let mut tags = ModuleTag::default();
        tags |= ModuleTag::EXEC_AND_REMOVE;
        tags |= ModuleTag::SEQUENTIAL;
        assert!(tags.contains(ModuleTag::EXEC_AND_REMOVE));
        assert!(tags.contains(ModuleTag::SEQUENTIAL));
        assert!(!tags.contains(ModuleTag::REMOVABLE));
    }
}
