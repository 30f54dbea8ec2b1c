//! Build context
//!
//! One [`BuildContext`] is created per invocation (and per watch-triggered
//! rebuild). It holds the resolved build settings and derives the output
//! artifact path and the entry-point source file.

use crate::command::Injection;
use crate::error::{BuildError, BuildResult};
use crate::flags::FlagSet;
use crate::paths;
use chrono::{DateTime, Utc};
use qgo_config::{Config, ConfigError, LookupError, Value};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Boolean `go build` flags enabled by a `true` manifest key of the same name
const BOOLEAN_BUILD_FLAGS: [&str; 11] = [
    "a",
    "n",
    "race",
    "msan",
    "asan",
    "cover",
    "v",
    "work",
    "x",
    "modcacherw",
    "trimpath",
];

/// Valued `go build` flags taken from a manifest key of the same name
const VALUED_BUILD_FLAGS: [&str; 12] = [
    "p",
    "covermode",
    "buildmode",
    "buildvcs",
    "compiler",
    "installsuffix",
    "mod",
    "modfile",
    "overlay",
    "pgo",
    "pkgdir",
    "toolexec",
];

/// Suffixes stripped from a binary name before the target suffix is applied
const BINARY_SUFFIXES: [&str; 3] = [".go", ".exe", ".wasm"];

/// Toolchain name of the host operating system
pub fn host_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Strip every trailing `.go`/`.exe`/`.wasm` (case-insensitive) from `name`
/// and append `suffix` exactly once.
///
/// ```
/// use qgo_build::normalize_binary_name;
///
/// assert_eq!(normalize_binary_name("app.exe.exe", ".exe"), "app.exe");
/// assert_eq!(normalize_binary_name("main.go", ""), "main");
/// ```
pub fn normalize_binary_name(name: &str, suffix: &str) -> String {
    let mut base = name.trim();
    loop {
        let lower = base.to_ascii_lowercase();
        match BINARY_SUFFIXES.iter().find(|s| lower.ends_with(*s)) {
            Some(s) => base = &base[..base.len() - s.len()],
            None => break,
        }
    }

    if base.is_empty() {
        base = "main";
    }
    format!("{}{}", base, suffix)
}

/// Keep `[A-Za-z0-9_-]`, turning spaces into underscores
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// Per-invocation build settings
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Directory receiving the artifact
    pub output_path: PathBuf,
    /// Explicit artifact name (suffix normalized on use)
    pub output_file_name: Option<String>,
    /// Explicit entry-point source file
    pub input_file: Option<PathBuf>,
    pub target_os: Vec<String>,
    pub wasm: bool,
    /// Build with tinygo instead of go
    pub tiny: bool,
    /// `-X 'key=value'` entries and raw linker flags, de-duplicated
    pub linked_variables: Vec<String>,
    /// Manifest-supplied linker flags, placed ahead of the linked variables
    pub ldflags: Vec<String>,
    pub asm_flags: FlagSet,
    pub gccgo_flags: FlagSet,
    pub gc_flags: FlagSet,
    pub tags: Vec<String>,
    pub build_flags: Vec<String>,
    pub strip_symbols: bool,
    pub strip_debugging: bool,
    pub lib_paths: Vec<String>,
    pub shared: bool,
    pub ext_ld: Option<String>,
    pub ext_ld_flags: Vec<String>,
    pub tmp_dir: Option<String>,
    pub install_dependencies: bool,
    pub verbose: bool,
    /// Run `go mod tidy` before building
    pub tidy: bool,
    /// Compress the artifact with upx after building
    pub compress: bool,
    /// Disable Go workspace mode (`GOWORK=off`)
    pub no_work: bool,
    pub port: Option<u16>,
    pub ignore_cache: bool,
    /// Build directory
    pub cwd: PathBuf,
    /// Directory the tool was started from
    pub invocation_dir: PathBuf,
    /// Manifest-declared environment variables
    pub env: Vec<(String, String)>,
    /// Manifest-declared injected commands
    pub injections: Vec<Injection>,
    /// Manifest file the settings came from; a newer one invalidates the cache
    pub manifest_file: Option<PathBuf>,
    pub(crate) cached: bool,
    pub(crate) build_time: DateTime<Utc>,
}

impl BuildContext {
    /// Context rooted at the process working directory
    pub fn new() -> Self {
        let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::in_dir(dir)
    }

    /// Context rooted at `dir` (used as both build and invocation directory)
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            output_path: dir.join("bin"),
            output_file_name: None,
            input_file: None,
            target_os: vec![host_os().to_string()],
            wasm: false,
            tiny: false,
            linked_variables: Vec::new(),
            ldflags: Vec::new(),
            asm_flags: FlagSet::new("asmflags"),
            gccgo_flags: FlagSet::new("gccgoflags"),
            gc_flags: FlagSet::new("gcflags"),
            tags: Vec::new(),
            build_flags: Vec::new(),
            strip_symbols: false,
            strip_debugging: false,
            lib_paths: Vec::new(),
            shared: false,
            ext_ld: None,
            ext_ld_flags: Vec::new(),
            tmp_dir: None,
            install_dependencies: false,
            verbose: false,
            tidy: false,
            compress: false,
            no_work: false,
            port: None,
            ignore_cache: false,
            cwd: dir.clone(),
            invocation_dir: dir,
            env: Vec::new(),
            injections: Vec::new(),
            manifest_file: None,
            cached: false,
            build_time: Utc::now(),
        }
    }

    /// Pin the build timestamp linked into the binary
    pub fn with_build_time(mut self, time: DateTime<Utc>) -> Self {
        self.build_time = time;
        self
    }

    /// Set by the synthesizer when the existing artifact is current
    pub fn cached(&self) -> bool {
        self.cached
    }

    /// Apply manifest settings.
    ///
    /// A key holding the wrong kind of value is a configuration error.
    pub fn configure(&mut self, config: &Config) -> BuildResult<()> {
        self.manifest_file = config.file().map(Path::to_path_buf);

        if let Some(name) = config.opt_string("name")? {
            let name = sanitize_name(name);
            if !name.is_empty() {
                self.output_file_name = Some(name);
            }
        }

        if let Some(variables) = config.opt_object("variables")? {
            for (key, value) in variables {
                let rendered = scalar(&format!("variables.{}", key), value)?;
                let resolved = self.resolve_variable(config, rendered);
                self.add_linked_variable(key, &resolved);
            }
        }

        for key in ["output", "bin"] {
            if let Some(output) = config.opt_string(key)? {
                self.output_path = paths::normalize(Path::new(output), &self.invocation_dir);
            }
        }

        for tag in config.opt_strings("tags")?.unwrap_or_default() {
            self.add_tag(&tag);
        }

        if let Some(verbose) = config.opt_bool("verbose")? {
            self.verbose = verbose;
        }
        if let Some(install) = config.opt_bool("install")? {
            self.install_dependencies = install;
        }
        if let Some(cwd) = config.opt_string("cwd")? {
            self.cwd = paths::normalize(Path::new(paths::strip_quotes(cwd)), &self.invocation_dir);
        }

        for key in ["compress", "upx"] {
            if let Some(compress) = config.opt_bool(key)? {
                self.compress = compress;
            }
        }

        for flag in BOOLEAN_BUILD_FLAGS {
            if config.opt_bool(flag)? == Some(true) {
                self.add_build_flag(flag, None);
            }
        }

        for flag in VALUED_BUILD_FLAGS {
            let value = match config.get(flag) {
                Ok(value) => scalar(flag, value)?,
                Err(LookupError::Absent(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            self.add_build_flag(flag, Some(&value));
        }

        for (key, set) in [
            ("asmflags", &mut self.asm_flags),
            ("gccgoflags", &mut self.gccgo_flags),
            ("gcflags", &mut self.gc_flags),
        ] {
            for item in config.opt_strings(key)?.unwrap_or_default() {
                let mut parts = item.split([' ', '=']).filter(|part| !part.is_empty());
                if let Some(name) = parts.next() {
                    let values: Vec<&str> = parts.collect();
                    set.add(name, &values);
                }
            }
        }

        // `update` wins over `tidy` when both are present
        match config.opt_bool("update")? {
            Some(update) => self.tidy = update,
            None => {
                if let Some(tidy) = config.opt_bool("tidy")? {
                    self.tidy = tidy;
                }
            }
        }

        if let Some(wasm) = config.opt_bool("wasm")? {
            self.wasm = wasm;
        }
        if let Some(port) = config.opt_number("port")? {
            self.port = Some(parse_port(port)?);
        }
        if let Some(tiny) = config.opt_bool("tiny")? {
            self.tiny = tiny;
        }
        if let Some(minify) = config.opt_bool("minify")? {
            self.strip_symbols = minify;
            self.strip_debugging = minify;
        }
        if config.opt_bool("shrink")? == Some(true) {
            self.shrink();
        }
        if let Some(no_cache) = config.opt_bool("no-cache")? {
            self.ignore_cache = no_cache;
        }

        if let Some(ldflags) = config.opt_strings("ldflags")? {
            if !ldflags.is_empty() {
                self.ldflags = ldflags;
            }
        }
        if let Some(libs) = config.opt_strings("libpath")? {
            self.lib_paths = libs;
        }
        if let Some(shared) = config.opt_bool("shared")? {
            self.shared = shared;
        }
        if let Some(extld) = config.opt_string("extld")? {
            self.ext_ld = Some(extld.to_string());
        }
        if let Some(flags) = config.opt_strings("extldflags")? {
            self.ext_ld_flags = flags;
        }
        if let Some(dir) = config.opt_string("tmpdir")? {
            self.tmp_dir = Some(dir.to_string());
        }

        if let Some(injections) = config.deserialize::<Vec<Injection>>("inject")? {
            self.injections.extend(injections);
        }

        self.env = config.env_vars();
        Ok(())
    }

    fn resolve_variable(&self, config: &Config, value: String) -> String {
        if let Some(resolved) = config.resolve_reference(&value) {
            return resolved;
        }

        match value.get(..4) {
            Some(head) if head.eq_ignore_ascii_case("env.") => {
                std::env::var(&value[4..]).unwrap_or_default()
            }
            _ => value,
        }
    }

    /// Strip symbol tables through the gccgo flag group
    pub fn shrink(&mut self) {
        self.gccgo_flags.add("-s", &[]);
        self.gccgo_flags.add("-w", &[]);
    }

    /// Add a `-X 'key=value'` linked variable
    pub fn add_linked_variable(&mut self, key: &str, value: &str) {
        push_unique(&mut self.linked_variables, format!("-X '{}={}'", key, value));
    }

    /// Add a raw linker flag
    pub fn add_linked_flag(&mut self, flag: &str) {
        push_unique(&mut self.linked_variables, flag.to_string());
    }

    pub fn add_tag(&mut self, tag: &str) {
        push_unique(&mut self.tags, tag.to_string());
    }

    /// Add a `go build` flag rendered as `-name` or `-name=value`
    pub fn add_build_flag(&mut self, name: &str, value: Option<&str>) {
        let flag = match value {
            Some(value) => format!("-{}={}", name, value),
            None => format!("-{}", name),
        };
        push_unique(&mut self.build_flags, flag);
    }

    /// First requested target OS
    pub fn primary_os(&self) -> &str {
        self.target_os.first().map(String::as_str).unwrap_or(host_os())
    }

    /// Executable suffix for the current target
    pub fn binary_suffix(&self) -> &'static str {
        if self.wasm {
            ".wasm"
        } else if self.primary_os() == "windows" {
            ".exe"
        } else {
            ""
        }
    }

    /// Artifact file name with exactly one target suffix
    pub fn output_file_name(&self) -> String {
        let name = match &self.output_file_name {
            Some(name) => name.clone(),
            None => match self.input_file() {
                Ok(input) => input
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                Err(_) => self
                    .cwd
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            },
        };
        normalize_binary_name(&name, self.binary_suffix())
    }

    /// Absolute artifact path
    pub fn output(&self) -> PathBuf {
        self.output_path.join(self.output_file_name())
    }

    /// Entry-point source file: the explicit one, or the first `.go` file
    /// under the build directory that declares `func main()`
    pub fn input_file(&self) -> BuildResult<PathBuf> {
        if let Some(input) = &self.input_file {
            return Ok(paths::normalize(input, &self.invocation_dir));
        }

        find_entry_point(&self.cwd, &self.output_path)
            .ok_or_else(|| BuildError::missing_entry_point(&self.cwd))
    }

    /// Variables passed to every stage subprocess.
    ///
    /// Manifest variables come first so target overrides win.
    pub fn stage_env(&self) -> Vec<(String, String)> {
        let mut env = self.env.clone();

        if self.wasm {
            env.push(("GOOS".to_string(), "js".to_string()));
            env.push(("GOARCH".to_string(), "wasm".to_string()));
        } else if let [os] = self.target_os.as_slice() {
            if os != host_os() {
                env.push(("GOOS".to_string(), os.clone()));
            }
        }

        if self.no_work {
            env.push(("GOWORK".to_string(), "off".to_string()));
        }
        env
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new()
    }
}

fn scalar(key: &str, value: &Value) -> BuildResult<String> {
    value.to_scalar_string().ok_or_else(|| {
        BuildError::Config(ConfigError::InvalidValue {
            field: key.to_string(),
            reason: format!("expected a scalar, found {}", value.type_name()),
        })
    })
}

fn parse_port(port: f64) -> BuildResult<u16> {
    if port.fract() == 0.0 && (1.0..=65535.0).contains(&port) {
        Ok(port as u16)
    } else {
        Err(BuildError::Config(ConfigError::InvalidValue {
            field: "port".to_string(),
            reason: format!("{} is not a TCP port", port),
        }))
    }
}

/// First `.go` file (sorted walk) containing `func main()`
fn find_entry_point(dir: &Path, exclude: &Path) -> Option<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            !hidden && entry.path() != exclude
        })
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "go")
        })
        .find(|entry| {
            std::fs::read_to_string(entry.path())
                .map(|source| source.contains("func main()"))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
}
