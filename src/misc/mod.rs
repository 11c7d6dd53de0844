pub mod hash_select;
