#![no_main]

use libfuzzer_sys::fuzz_target;
extern crate peg_script;

use peg_script::{script::Script, withdraw::Flags};

fuzz_target!(|tup: (u32, [u8; 32], &[u8])| {
    // `fuzz_target!` doesn’t support pattern matching in the parameter list.
    let (flag_bits, genesis_hash, bytes) = tup;
    let flags = Flags::from_bits_truncate(flag_bits);
    let script = Script::from(bytes);

    script.is_push_only();
    script.sig_op_count(true);
    script.p2sh_sig_op_count(&script);
    let _ = script.to_string();

    if script.is_withdraw_output(flags) {
        script.get_fraud_bounty(flags);
    }
    if script.is_withdraw_proof() {
        script.get_withdraw_spent(flags);
    }
    for require_destination in [false, true] {
        for require_to_us in [false, true] {
            if script.is_withdraw_lock(&genesis_hash, require_destination, require_to_us) {
                assert!(script.is_withdraw_lock(&genesis_hash, false, false));
                script.get_withdraw_lock_genesis_hash();
            }
        }
    }
});
