use anyhow::{Context, Result, bail};
use lyra_dev::cli::ResolveArgs;
use lyra_dev::registry::{self, RegistryResolver};
use tokio::runtime::Runtime;

pub fn run(args: &ResolveArgs) -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let mut resolver = RegistryResolver::new()?;
    if let Some(url) = &args.registry {
        resolver = resolver.with_registry(url);
    }

    let rt = Runtime::new().context("failed to start tokio runtime")?;
    let metadata = rt
        .block_on(resolver.metadata(&args.package, args.full))
        .with_context(|| format!("failed to fetch metadata for {}", args.package))?;

    match registry::resolve_from_metadata(&metadata, &args.range)? {
        Some(version) => {
            println!("{version}");
            Ok(())
        }
        None => bail!(
            "no published version of {} satisfies `{}`",
            args.package,
            args.range
        ),
    }
}
