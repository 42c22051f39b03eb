#![no_main]

use cordyceps_avl::model::{self, MapOp};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|ops: Vec<MapOp>| {
    model::run_map_equivalence(ops);
});
