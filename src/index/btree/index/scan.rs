use serde::de::DeserializeOwned;
use serde::Serialize;

use super::base::BTreeIndex;
use crate::index::btree::error::BTreeError;
use crate::index::btree::iterator::BTreeIterator;

impl<K> BTreeIndex<K>
where
    K: Clone + Ord + Serialize + DeserializeOwned,
{
    /// Iterate every entry in key order, starting at the leftmost leaf.
    pub fn iter(&self) -> Result<BTreeIterator<K>, BTreeError> {
        match self.find_leaf_read(None)? {
            Some((leaf_id, guard, leaf)) => Ok(BTreeIterator::new(
                self.buffer_pool.clone(),
                leaf_id,
                guard,
                leaf,
                0,
            )),
            None => Ok(BTreeIterator::empty(self.buffer_pool.clone())),
        }
    }

    /// Iterate entries with key >= `key` in key order.
    pub fn iter_from(&self, key: &K) -> Result<BTreeIterator<K>, BTreeError> {
        match self.find_leaf_read(Some(key))? {
            Some((leaf_id, guard, leaf)) => {
                let start = leaf.key_index(key);
                Ok(BTreeIterator::new(
                    self.buffer_pool.clone(),
                    leaf_id,
                    guard,
                    leaf,
                    start,
                ))
            }
            None => Ok(BTreeIterator::empty(self.buffer_pool.clone())),
        }
    }
}
