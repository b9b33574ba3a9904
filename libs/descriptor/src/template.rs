//! Rendering of a built [`Deployment`] into provisioning-engine JSON.
//!
//! One entry per graph node under `Resources`, keyed by logical ID. Cross
//! references use `{"Ref": id}` or `{"Fn::GetAtt": [id, attr]}` and every
//! resource lists what it references under `DependsOn`, sorted. Object keys
//! are emitted in sorted order, so equal deployments render byte-identical
//! output.

use serde_json::{json, Map, Value};

use crate::deployment::{Deployment, LOAD_BALANCER_DNS_OUTPUT};
use crate::graph::ResourceKind;
use crate::model::cluster::ECS_AGENT_CONFIG_PATH;
use crate::model::ManagedPolicyRef;

/// Template description line.
pub const TEMPLATE_DESCRIPTION: &str =
    "Containerized web service with fault-injection access (ECS on EC2 behind an ALB)";

/// Metric tracked by the CPU scaling policy.
pub const CPU_METRIC: &str = "ECSServiceAverageCPUUtilization";

fn reference(id: &str) -> Value {
    json!({ "Ref": id })
}

fn attribute(id: &str, attr: &str) -> Value {
    json!({ "Fn::GetAtt": [id, attr] })
}

fn name_tag(name: &str) -> Value {
    json!([{ "Key": "Name", "Value": name }])
}

fn managed_policy_arns(policies: &[ManagedPolicyRef]) -> Vec<Value> {
    policies
        .iter()
        .map(|p| {
            json!({
                "Fn::Join": ["", [
                    "arn:",
                    { "Ref": "AWS::Partition" },
                    ":iam::aws:policy/",
                    p.name(),
                ]]
            })
        })
        .collect()
}

/// Render the whole template.
pub fn render(deployment: &Deployment) -> Value {
    let mut resources = Map::new();
    for (id, kind) in deployment.graph().nodes() {
        let properties = properties(deployment, id, kind);
        let depends_on: Vec<&str> = deployment.graph().dependencies(id);
        let mut entry = Map::new();
        entry.insert("Type".into(), Value::from(kind.provider_type()));
        entry.insert("Properties".into(), properties);
        if !depends_on.is_empty() {
            entry.insert("DependsOn".into(), json!(depends_on));
        }
        resources.insert(id.to_string(), Value::Object(entry));
    }

    json!({
        "Description": TEMPLATE_DESCRIPTION,
        "Resources": resources,
        "Outputs": outputs(deployment),
    })
}

/// The `Outputs` section.
pub fn outputs(deployment: &Deployment) -> Value {
    let lb = deployment.load_balancer.id.as_str();
    json!({
        LOAD_BALANCER_DNS_OUTPUT: {
            "Description": "Public URL of the load balancer",
            "Value": {
                "Fn::Join": ["", ["http://", attribute(lb, "DNSName")]]
            }
        }
    })
}

fn properties(d: &Deployment, id: &str, kind: ResourceKind) -> Value {
    match kind {
        ResourceKind::Network => json!({
            "CidrBlock": d.network.cidr.to_string(),
            "EnableDnsHostnames": true,
            "EnableDnsSupport": true,
            "Tags": name_tag(&d.network.name),
        }),
        ResourceKind::Subnet => d
            .network
            .subnets
            .iter()
            .find(|s| s.id.as_str() == id)
            .map(|s| {
                json!({
                    "VpcId": reference(d.network.id.as_str()),
                    "AvailabilityZone": s.availability_zone,
                    "CidrBlock": s.cidr.to_string(),
                    "MapPublicIpOnLaunch": s.map_public_ip_on_launch,
                    "Tags": name_tag(s.id.as_str()),
                })
            })
            .unwrap_or_else(|| json!({})),
        ResourceKind::InternetGateway => json!({
            "Tags": name_tag(id),
        }),
        ResourceKind::GatewayAttachment => d
            .network
            .internet_gateway
            .as_ref()
            .map(|igw| {
                json!({
                    "VpcId": reference(d.network.id.as_str()),
                    "InternetGatewayId": reference(igw.id.as_str()),
                })
            })
            .unwrap_or_else(|| json!({})),
        ResourceKind::RouteTable => json!({
            "VpcId": reference(d.network.id.as_str()),
            "Tags": name_tag(id),
        }),
        ResourceKind::Route => match (&d.network.public_routes, &d.network.internet_gateway) {
            (Some(routes), Some(igw)) => json!({
                "RouteTableId": reference(routes.id.as_str()),
                "DestinationCidrBlock": routes.destination.to_string(),
                "GatewayId": reference(igw.id.as_str()),
            }),
            _ => json!({}),
        },
        ResourceKind::RouteTableAssociation => d
            .network
            .public_routes
            .as_ref()
            .and_then(|routes| {
                routes
                    .associations
                    .iter()
                    .find(|a| a.id.as_str() == id)
                    .map(|a| {
                        json!({
                            "SubnetId": reference(a.subnet.as_str()),
                            "RouteTableId": reference(routes.id.as_str()),
                        })
                    })
            })
            .unwrap_or_else(|| json!({})),
        ResourceKind::InstanceRole => {
            let role = &d.capacity.instance_role;
            json!({
                "AssumeRolePolicyDocument": role.trust.document(),
                "ManagedPolicyArns": managed_policy_arns(&role.managed_policies),
            })
        }
        ResourceKind::InstanceProfile => json!({
            "Roles": [reference(d.capacity.instance_profile.role.as_str())],
        }),
        ResourceKind::NodeSecurityGroup => {
            let sg = &d.capacity.security_group;
            json!({
                "GroupDescription": format!("Nodes of {}", d.capacity.id),
                "VpcId": reference(sg.network.as_str()),
            })
        }
        ResourceKind::NodeIngress => d
            .capacity
            .security_group
            .ingress
            .as_ref()
            .map(|rule| {
                json!({
                    "GroupId": attribute(d.capacity.security_group.id.as_str(), "GroupId"),
                    "IpProtocol": "tcp",
                    "FromPort": rule.from_port,
                    "ToPort": rule.to_port,
                    "SourceSecurityGroupId": attribute(rule.source.as_str(), "GroupId"),
                    "Description": format!("Load balancer to task host ports from {}", rule.source),
                })
            })
            .unwrap_or_else(|| json!({})),
        ResourceKind::LaunchTemplate => {
            let lt = &d.capacity.launch_template;
            let user_data = json!({
                "Fn::Join": ["", [
                    "#!/bin/bash\necho ECS_CLUSTER=",
                    reference(lt.cluster.as_str()),
                    format!(" >> {ECS_AGENT_CONFIG_PATH}\n"),
                ]]
            });
            json!({
                "LaunchTemplateData": {
                    "ImageId": lt.image_id(),
                    "InstanceType": d.capacity.instance_type.name,
                    "IamInstanceProfile": {
                        "Arn": attribute(lt.instance_profile.as_str(), "Arn"),
                    },
                    "SecurityGroupIds": [attribute(lt.security_group.as_str(), "GroupId")],
                    "UserData": { "Fn::Base64": user_data },
                },
            })
        }
        ResourceKind::Cluster => json!({
            "ClusterName": d.cluster.name,
            "ClusterSettings": [{
                "Name": "containerInsights",
                "Value": if d.cluster.container_insights { "enabled" } else { "disabled" },
            }],
        }),
        ResourceKind::CapacityPool => {
            let pool = &d.capacity;
            let subnets: Vec<Value> = pool
                .subnets
                .iter()
                .map(|s| reference(s.as_str()))
                .collect();
            json!({
                "MinSize": pool.node_min.to_string(),
                "MaxSize": pool.node_max.to_string(),
                "DesiredCapacity": pool.node_count().to_string(),
                "VPCZoneIdentifier": subnets,
                "LaunchTemplate": {
                    "LaunchTemplateId": reference(pool.launch_template.id.as_str()),
                    "Version": attribute(pool.launch_template.id.as_str(), "LatestVersionNumber"),
                },
            })
        }
        ResourceKind::TaskSpec => {
            let containers: Vec<Value> = d
                .task_spec
                .containers
                .iter()
                .map(|c| {
                    let mappings: Vec<Value> = c
                        .port_mappings
                        .iter()
                        .map(|m| {
                            json!({
                                "ContainerPort": m.container_port,
                                "HostPort": m.host_port,
                                "Protocol": m.protocol.as_str(),
                            })
                        })
                        .collect();
                    json!({
                        "Name": c.name,
                        "Image": c.image,
                        "Memory": c.memory_limit_mib,
                        "Essential": true,
                        "PortMappings": mappings,
                    })
                })
                .collect();
            json!({
                "NetworkMode": d.task_spec.network_mode,
                "RequiresCompatibilities": ["EC2"],
                "ContainerDefinitions": containers,
            })
        }
        ResourceKind::Service => {
            let svc = &d.service;
            let (strategy, field) = svc.placement.provider_form();
            let load_balancers: Vec<Value> = svc
                .load_balancer
                .iter()
                .map(|r| {
                    json!({
                        "ContainerName": r.container_name,
                        "ContainerPort": r.container_port,
                        "TargetGroupArn": reference(r.target_group.as_str()),
                    })
                })
                .collect();
            json!({
                "Cluster": reference(svc.cluster.as_str()),
                "TaskDefinition": reference(svc.task_spec.as_str()),
                "DesiredCount": svc.desired_count,
                "LaunchType": "EC2",
                "PlacementStrategies": [{ "Type": strategy, "Field": field }],
                "LoadBalancers": load_balancers,
            })
        }
        ResourceKind::ScalingTarget => {
            let target = &d.service.scaling_target;
            json!({
                "MinCapacity": target.min_capacity,
                "MaxCapacity": target.max_capacity,
                "ServiceNamespace": "ecs",
                "ScalableDimension": "ecs:service:DesiredCount",
                "ResourceId": {
                    "Fn::Join": ["/", [
                        "service",
                        reference(d.service.cluster.as_str()),
                        attribute(d.service.id.as_str(), "Name"),
                    ]]
                },
            })
        }
        ResourceKind::ScalingPolicy => {
            let policy = &d.service.scaling_policy;
            json!({
                "PolicyName": policy.id.as_str(),
                "PolicyType": "TargetTrackingScaling",
                "ScalingTargetId": reference(d.service.scaling_target.id.as_str()),
                "TargetTrackingScalingPolicyConfiguration": {
                    "TargetValue": policy.target_utilization_percent,
                    "ScaleInCooldown": policy.scale_in_cooldown.as_secs(),
                    "ScaleOutCooldown": policy.scale_out_cooldown.as_secs(),
                    "PredefinedMetricSpecification": {
                        "PredefinedMetricType": CPU_METRIC,
                    },
                },
            })
        }
        ResourceKind::SecurityGroup => {
            let sg = &d.load_balancer.security_group;
            let ingress: Vec<Value> = sg
                .open_ports
                .iter()
                .map(|port| {
                    json!({
                        "IpProtocol": "tcp",
                        "FromPort": port,
                        "ToPort": port,
                        "CidrIp": "0.0.0.0/0",
                        "Description": format!("Allow from anyone on port {port}"),
                    })
                })
                .collect();
            json!({
                "GroupDescription": format!("Security group for {}", d.load_balancer.id),
                "VpcId": reference(sg.network.as_str()),
                "SecurityGroupIngress": ingress,
            })
        }
        ResourceKind::LoadBalancer => {
            let lb = &d.load_balancer;
            json!({
                "Type": "application",
                "Scheme": if lb.internet_facing { "internet-facing" } else { "internal" },
                "Subnets": lb.subnets.iter().map(|s| reference(s.as_str())).collect::<Vec<_>>(),
                "SecurityGroups": [attribute(lb.security_group.id.as_str(), "GroupId")],
            })
        }
        ResourceKind::Listener => d
            .load_balancer
            .listeners
            .iter()
            .find(|l| l.id.as_str() == id)
            .map(|l| {
                json!({
                    "LoadBalancerArn": reference(d.load_balancer.id.as_str()),
                    "Port": l.port,
                    "Protocol": "HTTP",
                    "DefaultActions": [{
                        "Type": "forward",
                        "TargetGroupArn": reference(l.target_group.as_str()),
                    }],
                })
            })
            .unwrap_or_else(|| json!({})),
        ResourceKind::TargetGroup => {
            let tg = &d.target_group;
            json!({
                "VpcId": reference(tg.network.as_str()),
                "Port": tg.port,
                "Protocol": tg.protocol,
                "TargetType": "instance",
                "HealthCheckPath": tg.health_check.path,
                "HealthCheckTimeoutSeconds": tg.health_check.timeout.as_secs(),
                "HealthCheckIntervalSeconds": tg.health_check.interval.as_secs(),
                "TargetGroupAttributes": [{
                    "Key": "load_balancing.algorithm.type",
                    "Value": tg.algorithm.as_provider_str(),
                }],
            })
        }
        ResourceKind::Role => {
            let role = &d.role;
            json!({
                "RoleName": role.role_name,
                "Description": role.description,
                "AssumeRolePolicyDocument": role.trust.document(),
                "ManagedPolicyArns": managed_policy_arns(&role.managed_policies),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::DeploymentConfig;

    fn template() -> Value {
        Deployment::build(&DeploymentConfig::default())
            .unwrap()
            .template()
    }

    #[test]
    fn test_one_resource_per_graph_node() {
        let deployment = Deployment::build(&DeploymentConfig::default()).unwrap();
        let template = deployment.template();
        let resources = template["Resources"].as_object().unwrap();

        assert_eq!(resources.len(), deployment.graph().len());
        for (id, kind) in deployment.graph().nodes() {
            assert_eq!(resources[id]["Type"], kind.provider_type());
        }
    }

    #[test]
    fn test_network_has_three_public_subnets_and_no_nat() {
        let template = template();
        let resources = template["Resources"].as_object().unwrap();

        let subnets: Vec<_> = resources
            .values()
            .filter(|r| r["Type"] == "AWS::EC2::Subnet")
            .collect();
        assert_eq!(subnets.len(), 3);
        assert!(subnets.iter().all(|s| s["Properties"]["MapPublicIpOnLaunch"] == true));
        assert!(!resources
            .values()
            .any(|r| r["Type"] == "AWS::EC2::NatGateway"));
        assert_eq!(resources["FISDemo-VPC"]["Properties"]["CidrBlock"], "10.0.0.0/16");
    }

    #[test]
    fn test_task_port_mapping() {
        let template = template();
        let container = &template["Resources"]["FISDemo-TaskDef"]["Properties"]
            ["ContainerDefinitions"][0];

        assert_eq!(container["Image"], "nginx:1.24-alpine");
        assert_eq!(container["Memory"], 256);
        assert_eq!(
            container["PortMappings"],
            json!([{ "ContainerPort": 80, "HostPort": 8080, "Protocol": "tcp" }])
        );
    }

    #[test]
    fn test_service_and_scaling() {
        let template = template();
        let resources = &template["Resources"];

        let service = &resources["FISDemo-Service"]["Properties"];
        assert_eq!(service["DesiredCount"], 2);
        assert_eq!(
            service["PlacementStrategies"],
            json!([{ "Type": "spread", "Field": "instanceId" }])
        );
        assert_eq!(service["LoadBalancers"][0]["ContainerPort"], 80);

        let target = &resources["FISDemo-ScalingTarget"]["Properties"];
        assert_eq!(target["MinCapacity"], 2);
        assert_eq!(target["MaxCapacity"], 4);

        let policy = &resources["FISDemo-CpuScaling"]["Properties"]
            ["TargetTrackingScalingPolicyConfiguration"];
        assert_eq!(policy["TargetValue"], 50);
        assert_eq!(policy["ScaleInCooldown"], 60);
        assert_eq!(policy["ScaleOutCooldown"], 60);
        assert_eq!(
            policy["PredefinedMetricSpecification"]["PredefinedMetricType"],
            CPU_METRIC
        );

        let pool = &resources["FISDemo-asg"]["Properties"];
        assert_eq!(pool["MinSize"], pool["MaxSize"]);
    }

    #[test]
    fn test_public_subnets_route_to_internet() {
        let template = template();
        let resources = &template["Resources"];

        let igw = &resources["FISDemo-IGW"];
        assert!(igw.get("DependsOn").is_none());
        assert!(igw["Properties"].get("Attachment").is_none());

        let attachment = &resources["FISDemo-IGWAttachment"];
        assert_eq!(attachment["Type"], "AWS::EC2::VPCGatewayAttachment");
        assert_eq!(
            attachment["Properties"],
            json!({
                "VpcId": { "Ref": "FISDemo-VPC" },
                "InternetGatewayId": { "Ref": "FISDemo-IGW" },
            })
        );

        let route = &resources["FISDemo-PublicDefaultRoute"];
        assert_eq!(
            route["Properties"],
            json!({
                "RouteTableId": { "Ref": "FISDemo-PublicRouteTable" },
                "DestinationCidrBlock": "0.0.0.0/0",
                "GatewayId": { "Ref": "FISDemo-IGW" },
            })
        );
        assert!(route["DependsOn"]
            .as_array()
            .unwrap()
            .contains(&json!("FISDemo-IGWAttachment")));

        for n in 1..=3 {
            let assoc = &resources[format!("FISDemo-RouteAssociation{n}")];
            assert_eq!(assoc["Type"], "AWS::EC2::SubnetRouteTableAssociation");
            assert_eq!(
                assoc["Properties"]["SubnetId"],
                json!({ "Ref": format!("FISDemo-Public{n}") })
            );
            assert_eq!(
                assoc["Properties"]["RouteTableId"],
                json!({ "Ref": "FISDemo-PublicRouteTable" })
            );
        }
    }

    #[test]
    fn test_pool_launches_cluster_nodes() {
        let template = template();
        let resources = &template["Resources"];

        let pool = &resources["FISDemo-asg"]["Properties"];
        assert!(pool.get("ClusterName").is_none());
        assert!(pool.get("InstanceType").is_none());
        assert_eq!(pool["DesiredCapacity"], "2");
        assert_eq!(
            pool["LaunchTemplate"],
            json!({
                "LaunchTemplateId": { "Ref": "FISDemo-LaunchTemplate" },
                "Version": { "Fn::GetAtt": ["FISDemo-LaunchTemplate", "LatestVersionNumber"] },
            })
        );

        let data = &resources["FISDemo-LaunchTemplate"]["Properties"]["LaunchTemplateData"];
        assert_eq!(data["InstanceType"], "t2.micro");
        assert!(data["ImageId"]
            .as_str()
            .unwrap()
            .starts_with("{{resolve:ssm:/aws/service/ecs/optimized-ami/"));
        assert_eq!(
            data["IamInstanceProfile"]["Arn"],
            json!({ "Fn::GetAtt": ["FISDemo-InstanceProfile", "Arn"] })
        );
        assert_eq!(
            data["SecurityGroupIds"],
            json!([{ "Fn::GetAtt": ["FISDemo-InstanceSecurityGroup", "GroupId"] }])
        );
        let parts = &data["UserData"]["Fn::Base64"]["Fn::Join"][1];
        assert_eq!(parts[0], "#!/bin/bash\necho ECS_CLUSTER=");
        assert_eq!(parts[1], json!({ "Ref": "FISDemo-Cluster" }));
        assert_eq!(parts[2], " >> /etc/ecs/ecs.config\n");

        let profile = &resources["FISDemo-InstanceProfile"]["Properties"];
        assert_eq!(profile["Roles"], json!([{ "Ref": "FISDemo-InstanceRole" }]));

        let role = &resources["FISDemo-InstanceRole"]["Properties"];
        assert_eq!(
            role["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"],
            "ec2.amazonaws.com"
        );
        assert_eq!(
            role["ManagedPolicyArns"][0]["Fn::Join"][1][3],
            "service-role/AmazonEC2ContainerServiceforEC2Role"
        );
    }

    #[test]
    fn test_nodes_admit_load_balancer_on_host_port() {
        let template = template();
        let resources = &template["Resources"];

        let node_sg = &resources["FISDemo-InstanceSecurityGroup"];
        assert_eq!(node_sg["Type"], "AWS::EC2::SecurityGroup");
        assert!(node_sg["Properties"].get("SecurityGroupIngress").is_none());

        let ingress = &resources["FISDemo-InstanceIngressFromLB"];
        assert_eq!(ingress["Type"], "AWS::EC2::SecurityGroupIngress");
        let props = &ingress["Properties"];
        assert_eq!(
            props["GroupId"],
            json!({ "Fn::GetAtt": ["FISDemo-InstanceSecurityGroup", "GroupId"] })
        );
        assert_eq!(
            props["SourceSecurityGroupId"],
            json!({ "Fn::GetAtt": ["FISDemo-LBSecurityGroup", "GroupId"] })
        );
        assert_eq!(props["IpProtocol"], "tcp");
        assert_eq!(props["FromPort"], 8080);
        assert_eq!(props["ToPort"], 8080);
    }

    #[test]
    fn test_exposure() {
        let template = template();
        let resources = &template["Resources"];

        let listener = &resources["FISDemo-Listener1"]["Properties"];
        assert_eq!(listener["Port"], 80);
        assert_eq!(
            listener["DefaultActions"][0]["TargetGroupArn"],
            json!({ "Ref": "FISDemo-TargetGroup" })
        );

        let tg = &resources["FISDemo-TargetGroup"]["Properties"];
        assert_eq!(tg["Port"], 8080);
        assert_eq!(tg["HealthCheckPath"], "/");
        assert_eq!(tg["HealthCheckTimeoutSeconds"], 30);
        assert_eq!(tg["HealthCheckIntervalSeconds"], 60);
        assert_eq!(tg["TargetGroupAttributes"][0]["Value"], "round_robin");

        let sg = &resources["FISDemo-LBSecurityGroup"]["Properties"];
        assert_eq!(sg["SecurityGroupIngress"][0]["CidrIp"], "0.0.0.0/0");
        assert_eq!(sg["SecurityGroupIngress"][0]["FromPort"], 80);

        assert_eq!(
            resources["FISDemo-LB"]["Properties"]["Scheme"],
            "internet-facing"
        );
    }

    #[test]
    fn test_role_trust_and_policies() {
        let template = template();
        let role = &template["Resources"]["FISDemo-role"];

        assert!(role.get("DependsOn").is_none());
        let props = &role["Properties"];
        assert_eq!(
            props["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"],
            "fis.amazonaws.com"
        );
        assert_eq!(props["Description"], "The role for FIS Demo");
        let names: Vec<_> = props["ManagedPolicyArns"]
            .as_array()
            .unwrap()
            .iter()
            .map(|arn| arn["Fn::Join"][1][3].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            [
                "service-role/AWSFaultInjectionSimulatorEC2Access",
                "service-role/AWSFaultInjectionSimulatorECSAccess"
            ]
        );
    }

    #[test]
    fn test_output_references_load_balancer_dns() {
        let template = template();
        assert_eq!(
            template["Outputs"][LOAD_BALANCER_DNS_OUTPUT]["Value"]["Fn::Join"][1][1],
            json!({ "Fn::GetAtt": ["FISDemo-LB", "DNSName"] })
        );
    }

    #[test]
    fn test_depends_on_is_sorted() {
        let template = template();
        let deps: Vec<_> = template["Resources"]["FISDemo-Service"]["DependsOn"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        let mut sorted = deps.clone();
        sorted.sort_unstable();
        assert_eq!(deps, sorted);
        assert!(deps.contains(&"FISDemo-Listener1"));
    }

    #[test]
    fn test_rendering_is_byte_identical() {
        let a = serde_json::to_string(&template()).unwrap();
        let b = serde_json::to_string(&template()).unwrap();
        assert_eq!(a, b);
    }
}
