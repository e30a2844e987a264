//! Prints the `CustomResourceDefinition` YAML for both canary kinds
//! (`KanaryDeployment`, `KanaryStatefulset`) as a multi-document stream,
//! ready to pipe into `kubectl apply -f -` (§10.7).

use kanary::crd::{KanaryDeployment, KanaryStatefulset};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        serde_yaml::to_string(&KanaryDeployment::crd())?,
        serde_yaml::to_string(&KanaryStatefulset::crd())?,
    ];
    print!("{}", crds.join("---\n"));
    Ok(())
}
