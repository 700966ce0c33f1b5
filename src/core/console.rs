//! Console command surface - Recognizes free-text console input

/// Package managers whose install command triggers the dependency pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManager {
    Npm,
    /// `pkg`, an npm alias
    Pkg,
    Yarn,
    Bun,
    Pip,
    Composer,
    Cargo,
}

impl PackageManager {
    /// Directory created at the root once installation finishes
    pub fn artifact_dir(&self) -> &'static str {
        match self {
            Self::Npm | Self::Pkg | Self::Yarn | Self::Bun => "node_modules",
            Self::Pip => "venv",
            Self::Composer => "vendor",
            Self::Cargo => "target",
        }
    }

    /// What gets installed when no package is named
    pub fn manifest(&self) -> &'static str {
        match self {
            Self::Npm | Self::Pkg | Self::Yarn | Self::Bun => "package.json",
            Self::Pip => "requirements.txt",
            Self::Composer => "composer.json",
            Self::Cargo => "Cargo.toml",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pkg => "pkg",
            Self::Yarn => "yarn",
            Self::Bun => "bun",
            Self::Pip => "pip",
            Self::Composer => "composer",
            Self::Cargo => "cargo",
        }
    }
}

/// A recognized console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Dependency installation, with the package argument if one was given
    Install {
        manager: PackageManager,
        package: Option<String>,
    },
    /// Clear the console log
    Clear,
    /// Anything else; echoed back as executed
    Other(String),
}

impl ConsoleCommand {
    /// Parse trimmed, case-insensitive console input. Returns `None` for blank input.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }

        let lower = trimmed.to_lowercase();
        let tokens: Vec<&str> = lower.split_whitespace().collect();
        // Package names keep the case they were typed in
        let original: Vec<&str> = trimmed.split_whitespace().collect();
        let arg = |i: usize| original.get(i).map(|s| s.to_string());

        let install = |manager, package| Some(Self::Install { manager, package });

        match tokens.as_slice() {
            ["clear"] => Some(Self::Clear),
            ["npm", "install" | "i"] => install(PackageManager::Npm, None),
            ["npm", "install" | "i", ..] => install(PackageManager::Npm, arg(2)),
            ["pkg", "install" | "i"] => install(PackageManager::Pkg, None),
            ["pkg", "install" | "i", ..] => install(PackageManager::Pkg, arg(2)),
            ["yarn"] | ["yarn", "install"] => install(PackageManager::Yarn, None),
            ["yarn", "add", _, ..] => install(PackageManager::Yarn, arg(2)),
            ["bun", "install"] => install(PackageManager::Bun, None),
            ["bun", "install", ..] => install(PackageManager::Bun, arg(2)),
            ["pip", "install", _, ..] => install(PackageManager::Pip, arg(2)),
            ["composer", "install"] => install(PackageManager::Composer, None),
            ["cargo", "build", ..] => install(PackageManager::Cargo, None),
            _ => Some(Self::Other(trimmed.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_of(input: &str) -> Option<(PackageManager, Option<String>)> {
        match ConsoleCommand::parse(input)? {
            ConsoleCommand::Install { manager, package } => Some((manager, package)),
            _ => None,
        }
    }

    #[test]
    fn test_npm_variants() {
        assert_eq!(manager_of("npm install"), Some((PackageManager::Npm, None)));
        assert_eq!(manager_of("  NPM I  "), Some((PackageManager::Npm, None)));
        assert_eq!(
            manager_of("npm i Express"),
            Some((PackageManager::Npm, Some("Express".to_string())))
        );
        assert_eq!(manager_of("npm init"), None);
    }

    #[test]
    fn test_pkg_alias() {
        assert_eq!(manager_of("pkg i"), Some((PackageManager::Pkg, None)));
        assert_eq!(
            manager_of("PKG install left-pad"),
            Some((PackageManager::Pkg, Some("left-pad".to_string())))
        );
        assert_eq!(manager_of("pkg list"), None);
        assert_eq!(PackageManager::Pkg.artifact_dir(), "node_modules");
        assert_eq!(PackageManager::Pkg.manifest(), "package.json");
    }

    #[test]
    fn test_other_managers() {
        assert_eq!(manager_of("yarn"), Some((PackageManager::Yarn, None)));
        assert_eq!(
            manager_of("yarn add lodash"),
            Some((PackageManager::Yarn, Some("lodash".to_string())))
        );
        assert_eq!(manager_of("bun install"), Some((PackageManager::Bun, None)));
        assert_eq!(
            manager_of("pip install flask"),
            Some((PackageManager::Pip, Some("flask".to_string())))
        );
        assert_eq!(manager_of("pip install"), None);
        assert_eq!(manager_of("composer install"), Some((PackageManager::Composer, None)));
        assert_eq!(manager_of("cargo build --release"), Some((PackageManager::Cargo, None)));
    }

    #[test]
    fn test_clear_and_other() {
        assert_eq!(ConsoleCommand::parse(" Clear "), Some(ConsoleCommand::Clear));
        assert_eq!(
            ConsoleCommand::parse("  ls -la "),
            Some(ConsoleCommand::Other("ls -la".to_string()))
        );
        assert_eq!(ConsoleCommand::parse("   "), None);
    }

    #[test]
    fn test_artifact_dirs() {
        assert_eq!(PackageManager::Npm.artifact_dir(), "node_modules");
        assert_eq!(PackageManager::Bun.artifact_dir(), "node_modules");
        assert_eq!(PackageManager::Pip.artifact_dir(), "venv");
        assert_eq!(PackageManager::Composer.artifact_dir(), "vendor");
        assert_eq!(PackageManager::Cargo.artifact_dir(), "target");
    }
}
