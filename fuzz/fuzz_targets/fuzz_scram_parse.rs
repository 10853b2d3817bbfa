#![no_main]

use libfuzzer_sys::arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use mongo_wire::auth::scram::parse_server_first;
use mongo_wire::auth::{ScramClient, ScramMechanism};

#[derive(Debug)]
struct ScramInput {
    sha256: bool,
    username: String,
    password: String,
    server_first: String,
    server_final: String,
}

impl<'a> Arbitrary<'a> for ScramInput {
    fn arbitrary(u: &mut Unstructured<'a>) -> libfuzzer_sys::arbitrary::Result<Self> {
        Ok(Self {
            sha256: u.arbitrary()?,
            username: u.arbitrary()?,
            password: u.arbitrary()?,
            server_first: u.arbitrary()?,
            server_final: u.arbitrary()?,
        })
    }
}

fuzz_target!(|input: ScramInput| {
    let _ = parse_server_first(&input.server_first);

    let mechanism = if input.sha256 {
        ScramMechanism::Sha256
    } else {
        ScramMechanism::Sha1
    };
    let client = ScramClient::new(input.username, input.password).with_mechanism(mechanism);
    let _first = client.client_first();

    if let Ok((_, state)) = client.client_final(&input.server_first) {
        let _ = client.verify_server_final(&input.server_final, &state);
    }
});
