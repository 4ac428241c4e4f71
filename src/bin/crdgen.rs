use etcd_custodian::crd::Etcd;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Etcd::crd())?);
    Ok(())
}
