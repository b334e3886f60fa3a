use derive_builder::Builder;
use itertools::Itertools;
use std::fmt;

pub const DEFAULT_SAM_BINARY: &str = "sam";
pub const DEFAULT_CONFIG_ENV: &str = "default";
pub const DEFAULT_CONFIG_FILE: &str = "samconfig.toml";
pub const TEMPLATE_FLAG: &str = "--template";

/// Options forwarded to every `sam validate` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(setter(into))]
pub struct ValidationOptions {
    #[builder(default)]
    pub region: Option<String>,
    #[builder(default)]
    pub profile: Option<String>,
    #[builder(default = "DEFAULT_CONFIG_ENV.to_string()")]
    pub config_env: String,
    #[builder(default = "DEFAULT_CONFIG_FILE.to_string()")]
    pub config_file: String,
    #[builder(default = "true")]
    pub lint: bool,
    #[builder(default)]
    pub beta_features: bool,
    #[builder(default)]
    pub debug: bool,
    /// Number of validators allowed to run at once, 0 runs every command at once.
    #[builder(default)]
    pub max_concurrency: usize,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            config_env: DEFAULT_CONFIG_ENV.to_string(),
            config_file: DEFAULT_CONFIG_FILE.to_string(),
            lint: true,
            beta_features: false,
            debug: false,
            max_concurrency: 0,
        }
    }
}

/// A single validator command, kept as an argument vector so nothing is
/// ever interpreted by a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    program: String,
    args: Vec<String>,
    template: Option<String>,
}

impl CommandInvocation {
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The template this invocation validates, if one was given.
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }
}

impl fmt::Display for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            std::iter::once(&self.program).chain(self.args.iter()).join(" ")
        )
    }
}

#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SAM_BINARY)
    }
}

impl CommandBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn base_args(options: &ValidationOptions) -> Vec<String> {
        let mut args = vec!["validate".to_string()];

        if let Some(region) = &options.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        if let Some(profile) = &options.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }

        args.push("--config-env".to_string());
        args.push(options.config_env.clone());
        args.push("--config-file".to_string());
        args.push(options.config_file.clone());

        if options.debug {
            args.push("--debug".to_string());
        }

        if options.beta_features {
            args.push("--beta-features".to_string());
        } else {
            args.push("--no-beta-features".to_string());
        }

        if options.lint {
            args.push("--lint".to_string());
        }

        args
    }

    /// One invocation per file, or a single invocation without a template
    /// when no files were given so `sam` finds the template itself.
    pub fn build(&self, options: &ValidationOptions, files: &[String]) -> Vec<CommandInvocation> {
        let base = Self::base_args(options);

        if files.is_empty() {
            return vec![CommandInvocation {
                program: self.program.clone(),
                args: base,
                template: None,
            }];
        }

        files
            .iter()
            .map(|file| {
                let mut args = base.clone();
                args.push(TEMPLATE_FLAG.to_string());
                args.push(file.clone());
                CommandInvocation {
                    program: self.program.clone(),
                    args,
                    template: Some(file.clone()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_default_command_line() {
        let commands = CommandBuilder::default().build(&ValidationOptions::default(), &[]);

        assert_eq!(1, commands.len());
        assert_eq!(
            "sam validate --config-env default --config-file samconfig.toml --no-beta-features --lint",
            commands[0].to_string()
        );
        assert_eq!(None, commands[0].template());
    }

    #[test]
    fn test_lint_without_beta_features() {
        let options = ValidationOptionsBuilder::default()
            .lint(true)
            .beta_features(false)
            .build()
            .unwrap();

        let commands = CommandBuilder::default().build(&options, &files(&["a.yaml"]));
        let args = commands[0].args();

        assert!(args.contains(&"--lint".to_string()));
        assert!(args.contains(&"--no-beta-features".to_string()));
        assert!(!args.contains(&"--beta-features".to_string()));
    }

    #[test]
    fn test_all_options_are_forwarded() {
        let options = ValidationOptionsBuilder::default()
            .region(Some("eu-west-1".to_string()))
            .profile(Some("ci".to_string()))
            .config_env("prod")
            .config_file("deploy/samconfig.toml")
            .lint(false)
            .beta_features(true)
            .debug(true)
            .build()
            .unwrap();

        let commands = CommandBuilder::default().build(&options, &[]);

        assert_eq!(
            "sam validate --region eu-west-1 --profile ci --config-env prod \
             --config-file deploy/samconfig.toml --debug --beta-features",
            commands[0].to_string()
        );
        assert!(!commands[0].args().contains(&"--lint".to_string()));
        assert!(!commands[0].args().contains(&"--no-lint".to_string()));
    }

    #[test]
    fn test_one_command_per_file_in_order() {
        let options = ValidationOptions::default();
        let names = files(&["b.yaml", "a.yaml", "nested/c.yml"]);

        let commands = CommandBuilder::default().build(&options, &names);

        assert_eq!(3, commands.len());
        let templates: Vec<_> = commands.iter().filter_map(|c| c.template()).collect();
        assert_eq!(vec!["b.yaml", "a.yaml", "nested/c.yml"], templates);

        let base = &commands[0].args()[..commands[0].args().len() - 2];
        for command in &commands {
            assert_eq!(base, &command.args()[..command.args().len() - 2]);
        }
        assert_eq!(
            "sam validate --config-env default --config-file samconfig.toml --no-beta-features --lint --template b.yaml",
            commands[0].to_string()
        );
    }

    #[test]
    fn test_file_names_are_not_split() {
        let names = files(&["my templates/app; rm -rf.yaml"]);

        let commands = CommandBuilder::default().build(&ValidationOptions::default(), &names);

        assert_eq!(Some("my templates/app; rm -rf.yaml"), commands[0].template());
    }

    #[test]
    fn test_template_ignores_option_values() {
        let options = ValidationOptionsBuilder::default()
            .profile(Some("--template".to_string()))
            .config_env("--template")
            .build()
            .unwrap();

        let global = CommandBuilder::default().build(&options, &[]);
        let targeted = CommandBuilder::default().build(&options, &files(&["app.yaml"]));

        assert_eq!(None, global[0].template());
        assert_eq!(Some("app.yaml"), targeted[0].template());
    }

    #[test]
    fn test_build_is_idempotent() {
        let options = ValidationOptionsBuilder::default()
            .region(Some("us-east-1".to_string()))
            .build()
            .unwrap();
        let names = files(&["a.yaml", "b.yaml"]);
        let builder = CommandBuilder::new("/opt/sam/bin/sam");

        assert_eq!(builder.build(&options, &names), builder.build(&options, &names));
        assert_eq!("/opt/sam/bin/sam", builder.build(&options, &names)[0].program());
    }
}
