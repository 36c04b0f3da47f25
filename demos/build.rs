//! Sample build program
//!
//! ```text
//! cargo run --example build -- -l
//! cargo run --example build -- -v release
//! cargo run --example build -- --trace trace.json all
//! ```

use std::io::Write;
use std::time::Duration;
use tusk::toplevel::{self, Program, Target};
use tusk::{Context, Identity, InvalidTask, Runnable, TaskSpec};

/// Compiles one platform; dependencies on the same platform are shared
struct Compile {
    platform: &'static str,
}

impl Runnable for Compile {
    fn name(&self) -> String {
        format!("compile({})", self.platform)
    }

    fn identity(&self) -> Identity {
        Identity::keyed("compile", self.platform)
    }

    fn run(&self, ctx: &Context) -> anyhow::Result<()> {
        ctx.dep(TaskSpec::new("generate", generate))?;
        writeln!(ctx.stdout(), "compiling for {}", self.platform)?;
        ctx.sleep(Duration::from_millis(300))?;
        Ok(())
    }
}

fn generate(ctx: &Context) -> anyhow::Result<()> {
    writeln!(ctx.stdout(), "generating sources")?;
    ctx.sleep(Duration::from_millis(200))?;
    Ok(())
}

fn lint(ctx: &Context) -> anyhow::Result<()> {
    ctx.dep(TaskSpec::new("generate", generate))?;
    writeln!(ctx.stderr(), "warning: unused import")?;
    ctx.sleep(Duration::from_millis(100))?;
    Ok(())
}

fn test(ctx: &Context) -> anyhow::Result<()> {
    ctx.dep(Compile { platform: "linux" })?;
    writeln!(ctx.stdout(), "running 42 tests")?;
    ctx.sleep(Duration::from_millis(400))?;
    Ok(())
}

fn package(ctx: &Context) -> anyhow::Result<()> {
    ctx.deps([
        Compile { platform: "linux" },
        Compile { platform: "darwin" },
        Compile { platform: "windows" },
    ])?;
    writeln!(ctx.stdout(), "packaging 3 archives")?;
    Ok(())
}

fn publish() -> anyhow::Result<()> {
    anyhow::bail!("registry token is not set")
}

fn release(ctx: &Context) -> anyhow::Result<()> {
    ctx.serial_deps([
        TaskSpec::new("package", package).in_namespace("dist"),
        TaskSpec::new("publish", publish).in_namespace("dist"),
    ])?;
    Ok(())
}

fn all(ctx: &Context) -> anyhow::Result<()> {
    ctx.deps([
        TaskSpec::new("lint", lint),
        TaskSpec::new("test", test),
        TaskSpec::new("package", package).in_namespace("dist"),
    ])?;
    Ok(())
}

fn program() -> Result<Program, InvalidTask> {
    Ok(Program::new("build")
        .description("Sample build for the tusk task runner")
        .default_target("all")
        .target(
            Target::new(TaskSpec::new("all", all))?
                .synopsis("Lint, test and package")
                .comment("Runs lint, test and dist::package in parallel."),
        )
        .target(Target::new(TaskSpec::new("lint", lint))?.synopsis("Check the sources"))
        .target(Target::new(TaskSpec::new("test", test))?.synopsis("Run the test suite"))
        .target(
            Target::new(TaskSpec::new("package", package).in_namespace("dist"))?
                .synopsis("Build release archives"),
        )
        .target(
            Target::new(TaskSpec::new("release", release))?
                .synopsis("Package and publish (fails without a token)"),
        ))
}

fn main() {
    match program() {
        Ok(program) => toplevel::main(program),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
