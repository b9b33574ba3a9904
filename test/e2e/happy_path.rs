//! End-to-end happy path test.
//!
//! Builds the default deployment and walks the same path an operator would:
//!
//! 1. Load layered configuration (defaults plus a TOML file)
//! 2. Build and validate the descriptor
//! 3. Place the initial replicas on the fixed pool
//! 4. Follow a request from the listener to the container
//! 5. Render the template and check its output and fingerprint
//! 6. Drive the scaling policy with sustained high and low load
//!
//! ## Running
//!
//! ```bash
//! cargo test -p fisdemo-e2e --test happy_path
//! ```

use std::time::Duration;

use fisdemo_descriptor::{Deployment, DeploymentConfig, LOAD_BALANCER_DNS_OUTPUT};
use fisdemo_reconcile::{tasks_by_node, ScalingDirection};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn default_deployment() -> Deployment {
    init_tracing();
    Deployment::build(&DeploymentConfig::default()).expect("default descriptor builds")
}

#[test]
fn two_tasks_spread_over_two_nodes() {
    let deployment = default_deployment();

    assert_eq!(deployment.capacity.instance_type.name, "t2.micro");
    assert_eq!(deployment.capacity.node_count(), 2);
    assert_eq!(deployment.task_spec.demand().memory_mib, 256);
    assert_eq!(deployment.service.desired_count, 2);
    assert_eq!(deployment.service.scaling_target.max_capacity, 4);

    let placement = deployment.initial_placement().expect("initial replicas fit");
    let counts = tasks_by_node(&placement);
    assert_eq!(counts.len(), 2);
    assert!(counts.values().all(|&n| n == 1));
}

#[test]
fn request_path_from_listener_to_container() {
    let deployment = default_deployment();

    let listener = &deployment.load_balancer.listeners[0];
    assert_eq!(listener.port, 80);
    assert!(listener.open);
    assert!(deployment
        .load_balancer
        .security_group
        .open_ports
        .contains(&80));

    assert_eq!(listener.target_group, deployment.target_group.id);
    assert_eq!(deployment.target_group.port, 8080);
    assert_eq!(deployment.target_group.health_check.path, "/");
    assert_eq!(
        deployment.target_group.health_check.timeout,
        Duration::from_secs(30)
    );
    assert_eq!(
        deployment.target_group.health_check.interval,
        Duration::from_secs(60)
    );

    let registration = deployment
        .service
        .load_balancer
        .as_ref()
        .expect("service is registered with the target group");
    assert_eq!(registration.target_group, deployment.target_group.id);
    assert_eq!(registration.container_port, 80);

    let container = deployment
        .task_spec
        .container(&registration.container_name)
        .expect("registered container exists");
    assert_eq!(container.image, "nginx:1.24-alpine");
    let mapping = container.port_mappings[0];
    assert_eq!((mapping.container_port, mapping.host_port), (80, 8080));
}

#[test]
fn template_exposes_load_balancer_dns() {
    let deployment = default_deployment();
    let template = deployment.template();

    let outputs = template["Outputs"].as_object().expect("outputs section");
    assert_eq!(outputs.len(), 1);
    assert!(outputs.contains_key(LOAD_BALANCER_DNS_OUTPUT));

    let resources = template["Resources"].as_object().expect("resources section");
    assert!(!resources
        .values()
        .any(|r| r["Type"] == "AWS::EC2::NatGateway"));
    let principals: Vec<_> = resources
        .values()
        .filter(|r| r["Type"] == "AWS::IAM::Role")
        .map(|r| {
            r["Properties"]["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"]
                .as_str()
                .expect("service principal")
        })
        .collect();
    // Node role first (sorted by logical ID), then the fault-injection role.
    assert_eq!(principals, ["ec2.amazonaws.com", "fis.amazonaws.com"]);

    // Nodes can reach the internet and join the cluster.
    assert_eq!(
        resources["FISDemo-PublicDefaultRoute"]["Properties"]["DestinationCidrBlock"],
        "0.0.0.0/0"
    );
    assert_eq!(
        resources["FISDemo-asg"]["Properties"]["LaunchTemplate"]["LaunchTemplateId"],
        serde_json::json!({ "Ref": "FISDemo-LaunchTemplate" })
    );
    assert_eq!(
        resources["FISDemo-InstanceIngressFromLB"]["Properties"]["FromPort"],
        8080
    );

    let fingerprint = deployment.fingerprint();
    assert!(fingerprint.as_str().starts_with("sha256:"));
    assert_eq!(fingerprint, default_deployment().fingerprint());
}

#[test]
fn config_file_overrides_defaults() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("deploy.toml");
    std::fs::write(
        &path,
        r#"
prefix = "ChaosLab"

[capacity]
node_count = 4

[task]
host_port = 0
"#,
    )
    .expect("write config");

    let config = DeploymentConfig::load(Some(path.as_path())).expect("config loads");
    let deployment = Deployment::build(&config).expect("descriptor builds");

    assert_eq!(deployment.network.id.as_str(), "ChaosLab-VPC");
    assert_eq!(deployment.capacity.node_count(), 4);
    assert_eq!(deployment.service.desired_count, 2);
    assert!(deployment.capacity_report().advisories.is_empty());
    assert_ne!(
        deployment.fingerprint(),
        default_deployment().fingerprint()
    );
}

#[test]
fn invalid_config_fails_before_rendering() {
    init_tracing();
    let mut config = DeploymentConfig::default();
    config.health_check.timeout_secs = 90;

    let err = Deployment::build(&config).expect_err("timeout above interval");
    let (resource, chain) = err.failing_resource().expect("tied to one resource");
    assert_eq!(resource, "FISDemo-TargetGroup");
    assert_eq!(
        chain.to_string(),
        "FISDemo-LB -> FISDemo-Listener1 -> FISDemo-TargetGroup"
    );
}

#[test]
fn sustained_load_scales_within_bounds() {
    let deployment = default_deployment();

    let mut simulator = deployment.scaling_simulator().expect("simulator");
    let out = simulator.run_constant_load(90.0, Duration::from_secs(300), Duration::from_secs(30));
    assert_eq!(simulator.current(), 4);
    assert!(out.iter().all(|a| a.direction == ScalingDirection::Out));
    assert!(out.iter().all(|a| a.to <= 4));

    // Past the scale-out's cooldown, low load brings the service back to min.
    let back = simulator.observe(Duration::from_secs(600), 5.0);
    assert_eq!(back.map(|a| a.to), Some(2));
    assert_eq!(simulator.current(), 2);

    // Four replicas exceed the pool: 8080 is bound once per node.
    assert!(deployment.place(4).is_err());
    assert!(!deployment.capacity_report().fits_max());
}
