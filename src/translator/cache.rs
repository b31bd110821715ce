// License below.
//! The translation cache: the map from an ARM basic-block's guest
//! address to the first byte of its emitted x86 translation.
#![cfg_attr(feature="clippy", warn(result_unwrap_used, option_unwrap_used, print_stdout))]
#![warn(missing_docs)]

use std::collections::HashMap;

/// Maps ARM basic-block start addresses to the host address of their
/// translation. Entries are inserted once per guest address and never
/// evicted within a run.
pub struct TranslationCache {
    map: HashMap<u32, u32>,
}

impl TranslationCache {
    /// Creates an empty cache.
    pub fn new() -> TranslationCache {
        TranslationCache { map: HashMap::new() }
    }

    /// Looks up the host address for a previously translated guest block.
    pub fn lookup(&self, guest_addr: u32) -> Option<u32> {
        self.map.get(&guest_addr).copied()
    }

    /// Records a new translation. Guest addresses are block-start
    /// addresses and must be unique; inserting the same key twice would
    /// indicate the block builder re-translated an already-cached block,
    /// which its cache check at the start of a new block is supposed to
    /// prevent.
    pub fn insert(&mut self, guest_addr: u32, host_addr: u32) {
        debug_assert!(!self.map.contains_key(&guest_addr), "re-inserting a cached block");
        self.map.insert(guest_addr, host_addr);
    }

    /// Number of translated blocks, for diagnostics.
    pub fn len(&self) -> usize { self.map.len() }

    /// Whether no blocks have been translated yet.
    pub fn is_empty(&self) -> bool { self.map.is_empty() }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lookup_misses_until_inserted() {
        let mut c = TranslationCache::new();
        assert_eq!(c.lookup(0x8000), None);
        c.insert(0x8000, 0x1000);
        assert_eq!(c.lookup(0x8000), Some(0x1000));
    }

    #[test]
    fn distinct_guest_addresses_keep_distinct_entries() {
        let mut c = TranslationCache::new();
        c.insert(0x8000, 0x1000);
        c.insert(0x8004, 0x1040);
        assert_eq!(c.lookup(0x8000), Some(0x1000));
        assert_eq!(c.lookup(0x8004), Some(0x1040));
        assert_eq!(c.len(), 2);
    }
}


/*
Licensed to the Apache Software Foundation (ASF) under one
or more contributor license agreements.  See the NOTICE file
distributed with this work for additional information
regarding copyright ownership.  The ASF licenses this file
to you under the Apache License, Version 2.0 (the
"License"); you may not use this file except in compliance
with the License.  You may obtain a copy of the License at

  http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing,
software distributed under the License is distributed on an
"AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
KIND, either express or implied.  See the License for the
specific language governing permissions and limitations
under the License.
*/
