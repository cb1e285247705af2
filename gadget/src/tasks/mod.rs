//! Task implementations behind the CLI subcommands. Every task takes its
//! vendor client as a parameter, so tests can pass mocks instead.

pub mod artifactory;
pub mod bitbucket;
