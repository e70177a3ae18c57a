use stampede::prelude::*;

// Exit codes: 0 when every threshold passed, 1 when any failed, 2 on error.
fn main() {
    let summary = LoadTest::initialize().and_then(|load_test| load_test.execute());

    let code = match summary {
        Ok(summary) if summary.passed() => 0,
        Ok(_) => 1,
        Err(e) => {
            eprintln!("{}", e);
            2
        }
    };
    std::process::exit(code);
}
