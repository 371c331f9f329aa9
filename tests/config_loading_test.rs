//! The configuration tree shipped with the crate must load in every
//! environment and describe a valid field.

use std::path::PathBuf;

use brinectl_core::config::{ConfigManager, ConfigurationError, TopologyConfig};
use brinectl_core::constants::ControlMode;
use brinectl_core::place::PlaceGraph;

fn shipped_config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("config")
        .join("brinectl")
}

#[test]
fn test_shipped_environments_load() {
    let test = ConfigManager::load_from_directory_with_env(Some(shipped_config_dir()), "test")
        .unwrap();
    assert_eq!(test.config().engine.control_mode, ControlMode::Manual);
    assert_eq!(test.config().persistence.batch_size, 10);
    assert_eq!(test.config().engine.command_buffer_size, 64);

    let production =
        ConfigManager::load_from_directory_with_env(Some(shipped_config_dir()), "production")
            .unwrap();
    assert_eq!(
        production.config().engine.control_mode,
        ControlMode::Automatic
    );
    assert_eq!(production.config().persistence.batch_size, 500);
    assert_eq!(production.config().engine.default_rank, 2);
}

#[test]
fn test_unknown_environment_falls_back_to_base() {
    let manager =
        ConfigManager::load_from_directory_with_env(Some(shipped_config_dir()), "staging")
            .unwrap();
    assert_eq!(manager.config().persistence.batch_size, 100);
    assert!(manager.config().engine.cancel_on_goal_complete);
}

#[test]
fn test_shipped_topology_builds_place_graph() {
    let manager =
        ConfigManager::load_from_directory_with_env(Some(shipped_config_dir()), "test").unwrap();
    let topology = manager.load_topology().unwrap();
    let graph = PlaceGraph::from_topology(&topology).unwrap();

    assert!(graph.find_place("R1").is_some());
    assert_eq!(graph.get_put_rank_list("WL_R1"), ["P1", "P2"]);
    assert_eq!(graph.get_call_rank_list("WL_R1"), ["SEA"]);
    assert!(graph.flow_route("SEA", "R1").is_some());
    assert!(graph.set_command("ALL_GATES_OPEN").is_some());
    assert!(graph.scenario("SHUTDOWN").is_some());
}

#[test]
fn test_topology_with_dangling_reference_is_rejected() {
    let source = r#"
        [[places]]
        id = "R1"

        [[places.nodes]]
        node_id = "WL_R1"
        node_def_id = "waterLevel"
        put_places = ["NOWHERE"]
    "#;
    let err = TopologyConfig::from_toml_str(source, "inline").unwrap_err();
    assert!(matches!(err, ConfigurationError::UnknownReference { .. }));
}
