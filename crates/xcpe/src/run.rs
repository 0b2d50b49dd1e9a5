use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, Utc};
use effectpack::{
    AddEffect, EffectMessage, EffectPackage, EffectPackager, EffectParameter, EffectProject,
    PackageError, PackageKey, ParamParser, ParameterMessage, PACKAGE_EXTENSION,
};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::cli::{
    ConfigArgs, InspectArgs, KeyArgs, LintArgs, ListArgs, MessageAction, MessageCommand, PackArgs,
    ParamsArgs, UnpackArgs,
};
use crate::paths::AppPaths;
use crate::settings::Settings;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn package_key(args: &KeyArgs) -> Option<PackageKey> {
    PackageKey::from_passphrase(args.key.as_deref())
}

pub fn pack(args: PackArgs, paths: &AppPaths, settings: &Settings) -> Result<()> {
    let project = EffectProject::load(&args.project)
        .with_context(|| format!("failed to load effect project {}", args.project.display()))?;
    let (mut job, outcome) = project
        .to_encode_job(package_key(&args.key), Utc::now())
        .context("failed to gather project inputs")?;

    if job.metadata.author.is_empty() {
        if let Some(author) = &settings.author {
            job.metadata.author = author.clone();
        }
    }

    let rejected = outcome.skipped();
    if rejected > 0 && (args.strict || settings.strict_parameters) {
        for diagnostic in outcome.errors() {
            eprintln!("  {diagnostic}");
        }
        bail!("{rejected} parameter line(s) rejected; not packing in strict mode");
    }

    let output = match args.output {
        Some(path) => path,
        None => {
            let dir = settings
                .output_dir
                .clone()
                .unwrap_or_else(|| paths.effects_dir());
            EffectPackager::package_path(dir, &project.manifest().id)
        }
    };
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory {}", parent.display()))?;
    }

    let report = EffectPackager::new()
        .encode(job.as_request(), &output)
        .with_context(|| format!("failed to write package {}", output.display()))?;

    println!("Wrote {} ({} bytes)", report.path.display(), report.file_length);
    println!("  sha256      {}", hex::encode(report.hash));
    println!("  encrypted   {}", report.encrypted);
    println!(
        "  parameters  {} ({} rejected)",
        job.parameters.len(),
        rejected
    );
    println!("  images      {}", report.images.len());
    for image in &report.images {
        if image.is_placeholder() {
            println!("    (placeholder) {}", image.source.display());
        } else {
            println!("    {:<24} {} bytes", image.name, image.stored_len);
        }
    }
    for warning in outcome.warnings().chain(report.warnings.iter()) {
        println!("  {warning}");
    }
    for error in outcome.errors() {
        println!("  {error}");
    }
    Ok(())
}

fn decode(path: &Path, key: Option<&PackageKey>) -> Result<EffectPackage> {
    EffectPackager::new()
        .decode(path, key)
        .with_context(|| format!("failed to decode package {}", path.display()))
}

pub fn unpack(args: UnpackArgs) -> Result<()> {
    let package = decode(&args.package, package_key(&args.key).as_ref())?;
    let output = args
        .output
        .unwrap_or_else(|| args.package.with_extension(""));
    fs::create_dir_all(&output)
        .with_context(|| format!("failed to create {}", output.display()))?;

    write_json(&output.join("metadata.json"), package.metadata())?;
    write_json(&output.join("parameters.json"), package.parameters())?;

    let passes = package.passes();
    for (index, pass) in passes.iter().enumerate() {
        let path = output.join(format!("pass{}.hlsl", index + 1));
        fs::write(&path, pass).with_context(|| format!("failed to write {}", path.display()))?;
    }

    let images_dir = output.join("images");
    let mut written = 0usize;
    for (name, data) in package.images().iter() {
        if name.is_empty() {
            continue;
        }
        if !is_plain_file_name(name) {
            tracing::warn!(name, "skipping image with an unsafe file name");
            continue;
        }
        fs::create_dir_all(&images_dir)
            .with_context(|| format!("failed to create {}", images_dir.display()))?;
        let path = images_dir.join(name);
        fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))?;
        written += 1;
    }

    println!(
        "Unpacked {} into {}: {} pass(es), {} parameter(s), {} image(s)",
        package.metadata().id,
        output.display(),
        passes.len(),
        package.parameters().len(),
        written
    );
    Ok(())
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let serialized = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    fs::write(path, serialized).with_context(|| format!("failed to write {}", path.display()))
}

#[derive(Debug, Serialize)]
struct ImageSummary<'a> {
    name: &'a str,
    bytes: usize,
}

pub fn inspect(args: InspectArgs) -> Result<()> {
    let packager = EffectPackager::new();
    let header = packager
        .verify(&args.package)
        .with_context(|| format!("failed to verify package {}", args.package.display()))?;
    let key = package_key(&args.key);
    let package = match packager.decode(&args.package, key.as_ref()) {
        Ok(package) => Some(package),
        Err(PackageError::InvalidText { .. }) if key.is_none() => {
            tracing::info!("package content looks encrypted; pass --key to list passes and images");
            None
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to decode package {}", args.package.display()))
        }
    };
    let parameters = match &package {
        Some(package) => package.parameters().to_vec(),
        None => packager.read_parameters_only(&args.package)?,
    };
    let images: Option<Vec<ImageSummary<'_>>> = package.as_ref().map(|package| {
        package
            .images()
            .iter()
            .map(|(name, data)| ImageSummary {
                name,
                bytes: data.len(),
            })
            .collect()
    });
    let passes = package.as_ref().map(|package| package.passes().len());

    if args.json {
        let summary = json!({
            "version": header.version,
            "length": header.file_length,
            "sha256": hex::encode(header.hash),
            "metadata": header.metadata,
            "passes": passes,
            "parameters": parameters,
            "images": images,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let metadata = &header.metadata;
    println!("{} ({})", metadata.effect_name, metadata.id);
    println!("  version     {}", metadata.version);
    println!("  author      {}", metadata.author);
    println!("  created     {}", metadata.create_time.to_rfc3339());
    if !metadata.description.is_empty() {
        println!("  description {}", metadata.description);
    }
    for (tag, value) in &metadata.tags {
        println!("  tag         {tag} = {value}");
    }
    println!("  length      {} bytes", header.file_length);
    println!("  sha256      {}", hex::encode(header.hash));
    match passes {
        Some(count) => println!("  passes      {count}"),
        None => println!("  passes      (encrypted)"),
    }
    println!("  parameters  {}", parameters.len());
    for parameter in &parameters {
        println!("    {}", describe_parameter(parameter));
    }
    match images {
        Some(images) => {
            println!("  images      {}", images.len());
            for image in images {
                let name = if image.name.is_empty() {
                    "(placeholder)"
                } else {
                    image.name
                };
                println!("    {name:<24} {} bytes", image.bytes);
            }
        }
        None => println!("  images      (encrypted)"),
    }
    Ok(())
}

fn describe_parameter(parameter: &EffectParameter) -> String {
    let mut line = format!(
        "[pass {}] {} {} = {}",
        parameter.pass_id, parameter.ty, parameter.name, parameter.default_value
    );
    if !parameter.is_enum() {
        line.push_str(&format!(
            " [{}, {}]",
            parameter.min_value, parameter.max_value
        ));
    }
    if !parameter.description.is_empty() {
        line.push_str(&format!(" # {}", parameter.description));
    }
    line
}

pub fn params(args: ParamsArgs) -> Result<()> {
    let parameters = EffectPackager::new()
        .read_parameters_only(&args.package)
        .with_context(|| format!("failed to read parameters from {}", args.package.display()))?;
    let rendered = if args.compact {
        serde_json::to_string(&parameters)?
    } else {
        serde_json::to_string_pretty(&parameters)?
    };
    println!("{rendered}");
    Ok(())
}

pub fn lint(args: LintArgs) -> Result<()> {
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let outcome = ParamParser::new().parse_block(args.pass, &text);

    if args.json {
        let report = json!({
            "parameters": outcome.parameters,
            "diagnostics": outcome.diagnostics,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for parameter in &outcome.parameters {
            println!("ok    {}", describe_parameter(parameter));
        }
        for diagnostic in &outcome.diagnostics {
            println!("{diagnostic}");
        }
    }

    let rejected = outcome.skipped();
    if rejected > 0 {
        bail!(
            "{rejected} of {} parameter line(s) rejected",
            rejected + outcome.parameters.len()
        );
    }
    Ok(())
}

pub fn message(command: MessageCommand) -> Result<()> {
    let message = match command.action {
        MessageAction::Add { package, key } => {
            let package = decode(&package, package_key(&key).as_ref())?;
            EffectMessage::from(AddEffect::from_package(&package))
        }
        MessageAction::Update {
            package,
            name,
            value,
            pass,
        } => {
            let packager = EffectPackager::new();
            let header = packager
                .read_header(&package)
                .with_context(|| format!("failed to read package {}", package.display()))?;
            let parameters = packager
                .read_parameters_only(&package)
                .with_context(|| format!("failed to read parameters from {}", package.display()))?;
            let parameter = find_parameter(&parameters, &name, pass)?;
            let value = ParamParser::new()
                .parse_value(&parameter.ty, &value)
                .with_context(|| format!("invalid value for parameter '{name}'"))?;
            EffectMessage::update(
                header.metadata.id,
                ParameterMessage::from(parameter).with_value(value),
            )
        }
        MessageAction::Remove { id } => EffectMessage::remove(id),
        MessageAction::Clear => EffectMessage::ClearEffects,
        MessageAction::Sort { ids } => EffectMessage::sort(ids),
    };

    let envelope = message.stamped(Local::now());
    let rendered = if command.compact {
        envelope.to_json()?
    } else {
        envelope.to_json_pretty()?
    };
    println!("{rendered}");
    Ok(())
}

fn find_parameter<'a>(
    parameters: &'a [EffectParameter],
    name: &str,
    pass: Option<i32>,
) -> Result<&'a EffectParameter> {
    let matches: Vec<&EffectParameter> = parameters
        .iter()
        .filter(|parameter| parameter.name == name)
        .filter(|parameter| pass.map_or(true, |pass| parameter.pass_id == pass))
        .collect();
    match matches.as_slice() {
        [parameter] => Ok(*parameter),
        [] => Err(anyhow!("no parameter named '{name}'")),
        _ => Err(anyhow!(
            "parameter '{name}' exists in several passes; choose one with --pass"
        )),
    }
}

pub fn list(args: ListArgs, paths: &AppPaths) -> Result<()> {
    let dir = args.dir.unwrap_or_else(|| paths.effects_dir());
    if !dir.exists() {
        println!("No packages found; {} does not exist", dir.display());
        return Ok(());
    }

    let mut packages: Vec<PathBuf> = fs::read_dir(&dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(PACKAGE_EXTENSION))
        })
        .collect();
    packages.sort();

    if packages.is_empty() {
        println!("No packages found in {}", dir.display());
        return Ok(());
    }

    let packager = EffectPackager::new();
    println!("Packages in {}:", dir.display());
    for path in packages {
        match packager.read_header(&path) {
            Ok(header) => println!(
                "  {:<24} {:<28} v{:<8} {}",
                header.metadata.id,
                header.metadata.effect_name,
                header.metadata.version,
                path.display()
            ),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "unreadable package");
                println!("  {:<24} {}", "(unreadable)", path.display());
            }
        }
    }
    Ok(())
}

pub fn config(args: ConfigArgs, paths: &AppPaths, mut settings: Settings) -> Result<()> {
    let mut changed = false;
    if let Some(author) = args.author {
        settings.author = Some(author).filter(|author| !author.is_empty());
        changed = true;
    }
    if let Some(dir) = args.output_dir {
        settings.output_dir = Some(dir).filter(|dir| !dir.as_os_str().is_empty());
        changed = true;
    }
    if let Some(strict) = args.strict_parameters {
        settings.strict_parameters = strict;
        changed = true;
    }

    let settings_file = paths.settings_file();
    if changed {
        settings.persist(&settings_file)?;
        tracing::info!(path = %settings_file.display(), "saved settings");
    }
    print!("{}", toml::to_string_pretty(&settings)?);
    Ok(())
}

pub fn show_where(paths: &AppPaths, settings: &Settings) {
    println!("Directories:");
    println!("  config:     {}", paths.config_dir().display());
    println!("  data:       {}", paths.data_dir().display());
    println!("  settings:   {}", paths.settings_file().display());
    println!("  effects:    {}", paths.effects_dir().display());
    if let Some(dir) = &settings.output_dir {
        println!("  output:     {}", dir.display());
    }
}
