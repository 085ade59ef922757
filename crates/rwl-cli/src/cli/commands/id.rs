//! `rwl id` – print the collection id for a locator.

use rwl_core::source::collection_id;

pub fn run_id(locator: &str) {
    println!("{}", collection_id(locator));
}
