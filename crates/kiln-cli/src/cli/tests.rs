#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use crate::cli::{Cli, Command};

    #[test]
    fn test_dev_defaults() {
        let cli = Cli::try_parse_from(["kiln", "dev"]).unwrap();
        let Command::Dev(args) = cli.command else {
            panic!("expected dev command");
        };

        assert_eq!(args.root, PathBuf::from("."));
        assert!(args.port.is_none());
        assert!(!args.no_hmr);

        let overrides = args.overrides();
        assert!(overrides.dev.port.is_none());
        assert!(overrides.dev.hmr.is_none());
    }

    #[test]
    fn test_dev_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "kiln", "dev", "--port", "3000", "--host", "0.0.0.0", "--no-hmr", "--root", "app",
        ])
        .unwrap();
        let Command::Dev(args) = cli.command else {
            panic!("expected dev command");
        };

        assert_eq!(args.root, PathBuf::from("app"));
        let overrides = args.overrides();
        assert_eq!(overrides.dev.port, Some(3000));
        assert_eq!(overrides.dev.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(overrides.dev.hmr, Some(false));
    }

    #[test]
    fn test_build_flags_become_overrides() {
        let cli =
            Cli::try_parse_from(["kiln", "build", "-d", "out", "--no-fail-fast"]).unwrap();
        let Command::Build(args) = cli.command else {
            panic!("expected build command");
        };

        let overrides = args.overrides();
        assert_eq!(overrides.build.out_dir, Some(PathBuf::from("out")));
        assert_eq!(overrides.build.fail_fast, Some(false));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["kiln", "build", "--verbose", "--no-color"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.no_color);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["kiln", "-v", "-q", "dev"]).is_err());
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(Cli::try_parse_from(["kiln", "dev", "--port", "99999"]).is_err());
    }
}
