//! DRO register code map.

use arrayvec::ArrayVec;

/// Maximum number of entries (codes are 7 bits wide).
pub const MAX_CODES: usize = 128;

/// Translates compact in-file register codes into real register numbers.
///
/// Built once from the file header; there is no mutating API after
/// construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodeMap {
    entries: ArrayVec<u8, MAX_CODES>,
}

impl CodeMap {
    /// Build a code map from its raw table. Entries past [`MAX_CODES`] are
    /// unreachable by a 7-bit code and are ignored.
    pub fn new(table: &[u8]) -> Self {
        let mut entries = ArrayVec::new();
        for &register in table.iter().take(MAX_CODES) {
            entries.push(register);
        }
        Self { entries }
    }

    /// Register number for a code (the bank bit is masked off).
    pub fn register(&self, code: u8) -> Option<u8> {
        self.entries.get((code & 0x7F) as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_masks_bank_bit() {
        let map = CodeMap::new(&[0x20, 0x40, 0xB0]);
        assert_eq!(map.register(1), Some(0x40));
        assert_eq!(map.register(0x81), Some(0x40));
        assert_eq!(map.register(0x82), Some(0xB0));
    }

    #[test]
    fn out_of_range_code_is_none() {
        let map = CodeMap::new(&[0x20]);
        assert_eq!(map.register(1), None);
        assert_eq!(map.register(0x7F), None);
    }

    #[test]
    fn oversized_table_is_truncated() {
        let table = [0u8; 200];
        let map = CodeMap::new(&table);
        assert_eq!(map.len(), MAX_CODES);
    }
}
