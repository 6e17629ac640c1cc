pub mod trie_table;
