//! Demo rule set for the apmake runner.
//!
//! `apmake deep` runs `hello` and `compound`, then `deps`, then `deep`;
//! `apmake verydeep` checks the whole closure of `verydeep` recursively.

use apmake_cli::{recurse, rule, rule_with};
use apmake_core::Params;
use apmake_tools::{Command, ENV};

fn main() -> anyhow::Result<()> {
    rule("hello", &[], |_| {
        Command::run(r#"echo "hello world!""#)?;
        Ok(())
    });

    rule("compound", &[], |_| {
        let _ = Command::run(r#"echo "this is a compound command""#)?.success()
            && Command::run(r#"echo "print this if the previous command succeeded""#)?.success();
        Ok(())
    });

    rule("environment", &[], |_| {
        Command::from_args(["echo".to_string(), ENV.get("CONDA_PREFIX")])?;
        Ok(())
    });

    rule("deps", &["hello", "compound"], |_| {
        println!("I ran the prerequisites");
        ENV.set("TMP", "deps_done!");
        Ok(())
    });

    rule_with(
        "kwargs",
        &[],
        Params::new().with("param", "testing"),
        |params| {
            println!("param: {}", params.get_string("param", ""));
            Ok(())
        },
    );

    rule("deep", &["deps"], |_| {
        println!("{}", ENV.get("TMP"));
        ENV.set("TMP", "deep_done!");
        Ok(())
    });

    rule("verydeep", &["deep"], |_| {
        println!("{}", ENV.get("TMP"));
        Ok(())
    });
    recurse("verydeep");

    apmake_cli::run_cli()
}
