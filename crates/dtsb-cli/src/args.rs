use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use dtsb_core::{BundleOptions, CompilerOptions, DEFAULT_OUT_DIR, ExcludePattern};

/// CLI arguments for the dtsb binary.
#[derive(Parser, Debug)]
#[command(
    name = "dtsb",
    version,
    about = "Bundle third-party declaration files into a build's declaration output"
)]
pub struct CliArgs {
    /// Directory the build wrote its output to.
    #[arg(long = "output-path", alias = "outputPath", default_value = "dist")]
    pub output_path: PathBuf,

    /// Entry declaration file. Defaults to the `types` field of the output
    /// package.json, then to the first declaration file found.
    #[arg(long)]
    pub entry: Option<PathBuf>,

    /// Path to tsconfig.json; parent directories are searched too.
    #[arg(short = 'p', long = "project", default_value = "tsconfig.json")]
    pub project: PathBuf,

    /// Folder for dependency copies, relative to the output path.
    #[arg(long, default_value = DEFAULT_OUT_DIR)]
    pub out: PathBuf,

    /// Leave module specifiers matching this regex untouched. Repeatable.
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub excludes: Vec<String>,

    /// Override compilerOptions.moduleResolution.
    #[arg(
        long = "module-resolution",
        alias = "moduleResolution",
        value_enum,
        ignore_case = true
    )]
    pub module_resolution: Option<ModuleResolution>,

    /// Override compilerOptions.baseUrl.
    #[arg(long = "base-url", alias = "baseUrl")]
    pub base_url: Option<String>,

    /// Use color and formatting in output.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub pretty: Option<bool>,
}

impl CliArgs {
    pub fn bundle_options(&self) -> Result<BundleOptions> {
        let excludes = self
            .excludes
            .iter()
            .map(|source| ExcludePattern::new(source))
            .collect::<Result<Vec<_>>>()?;

        Ok(BundleOptions {
            entry: self.entry.clone(),
            config: self.project.clone(),
            compiler_options: CompilerOptions {
                module_resolution: self
                    .module_resolution
                    .map(|kind| kind.as_option().to_string()),
                base_url: self.base_url.clone(),
                ..Default::default()
            },
            out: self.out.clone(),
            excludes,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ModuleResolution {
    /// Deprecated: TypeScript 1.6 resolution strategy.
    Classic,
    /// Node.js style resolution for CommonJS.
    #[value(alias = "node")]
    Node10,
    /// Node.js 16+ resolution for ES modules and CommonJS.
    Node16,
    /// Latest Node.js resolution for ES modules and CommonJS.
    #[value(name = "nodenext", alias = "node-next")]
    NodeNext,
    /// Resolution for bundlers (Webpack, Rollup, esbuild, etc).
    Bundler,
}

impl ModuleResolution {
    /// Spelling used in tsconfig `compilerOptions`.
    pub fn as_option(self) -> &'static str {
        match self {
            ModuleResolution::Classic => "classic",
            ModuleResolution::Node10 => "node10",
            ModuleResolution::Node16 => "node16",
            ModuleResolution::NodeNext => "nodenext",
            ModuleResolution::Bundler => "bundler",
        }
    }
}

#[cfg(test)]
#[path = "tests/args_tests.rs"]
mod tests;
