//! Grouping of a user's memories into topical clusters.

use std::collections::HashMap;

use chrono::Utc;
use recall_models::{Memory, MemoryCluster};
use tracing::info;

use super::memory::MemoryService;
use crate::db::vector::{cosine_similarity, mean_vector};
use crate::db::{self, ClusterAssignment};
use crate::Result;

/// Default centroid similarity for joining a cluster.
pub const DEFAULT_CLUSTER_THRESHOLD: f32 = 0.75;

/// Clusters smaller than this are dropped.
const MIN_CLUSTER_SIZE: usize = 2;

/// Tags used to name a cluster.
const NAME_TAGS: usize = 2;

struct Group<'a> {
    members: Vec<&'a Memory>,
    centroid: Vec<f32>,
}

impl Group<'_> {
    fn recompute_centroid(&mut self) {
        if let Some(c) = mean_vector(self.members.iter().filter_map(|m| m.embedding.as_deref())) {
            self.centroid = c;
        }
    }
}

/// Greedy single pass: each memory joins the closest existing group whose
/// centroid it matches at `threshold`, else starts a new group.
fn group_memories(memories: &[Memory], threshold: f32) -> Vec<Group<'_>> {
    let mut groups: Vec<Group<'_>> = Vec::new();

    for memory in memories {
        let Some(embedding) = memory.embedding.as_deref().filter(|e| !e.is_empty()) else {
            continue;
        };

        let best = groups
            .iter()
            .enumerate()
            .map(|(i, g)| (i, cosine_similarity(embedding, &g.centroid)))
            .filter(|(_, s)| *s >= threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((i, _)) => {
                groups[i].members.push(memory);
                groups[i].recompute_centroid();
            }
            None => groups.push(Group {
                members: vec![memory],
                centroid: embedding.to_vec(),
            }),
        }
    }

    groups.retain(|g| g.members.len() >= MIN_CLUSTER_SIZE);
    groups
}

/// Most frequent tags across the members, ties broken by first appearance.
fn dominant_tags(members: &[&Memory], n: usize) -> Vec<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    let mut order = 0usize;
    for tag in members.iter().flat_map(|m| m.semantic_tags.iter()) {
        let entry = counts.entry(tag.as_str()).or_insert((0, order));
        entry.0 += 1;
        order += 1;
    }

    let mut tags: Vec<(&str, (usize, usize))> = counts.into_iter().collect();
    tags.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    tags.into_iter().take(n).map(|(t, _)| t.to_string()).collect()
}

fn cluster_name(members: &[&Memory]) -> String {
    let tags = dominant_tags(members, NAME_TAGS);
    if tags.is_empty() {
        format!("{} memories", members[0].memory_type)
    } else {
        tags.join(" & ")
    }
}

impl MemoryService {
    /// Recompute a user's clusters from their embedded memories.
    ///
    /// Replaces all existing clusters and member assignments. Memories
    /// without an embedding and singleton groups stay unclustered.
    pub async fn rebuild_clusters(&self, user_id: &str, threshold: f32) -> Result<Vec<MemoryCluster>> {
        let memories = db::list_embedded_memories(&self.db, user_id).await?;
        let groups = group_memories(&memories, threshold);
        let now = Utc::now();

        let assignments: Vec<ClusterAssignment> = groups
            .into_iter()
            .map(|group| {
                let count = group.members.len();
                let average_relevance =
                    group.members.iter().map(|m| m.relevance_score).sum::<f64>() / count as f64;
                let tags = dominant_tags(&group.members, 5);

                ClusterAssignment {
                    cluster: MemoryCluster {
                        id: recall_models::new_id(),
                        user_id: user_id.to_string(),
                        name: cluster_name(&group.members),
                        description: (!tags.is_empty())
                            .then(|| format!("{count} memories about {}", tags.join(", "))),
                        centroid: Some(group.centroid),
                        memory_count: count as i64,
                        average_relevance_score: average_relevance,
                        created_at: now,
                        updated_at: now,
                    },
                    member_ids: group.members.iter().map(|m| m.id.clone()).collect(),
                }
            })
            .collect();

        db::replace_clusters(&self.db, user_id, &assignments).await?;

        info!(
            user_id,
            clusters = assignments.len(),
            memories = memories.len(),
            "Rebuilt memory clusters"
        );

        let mut clusters: Vec<MemoryCluster> =
            assignments.into_iter().map(|a| a.cluster).collect();
        clusters.sort_by(|a, b| b.memory_count.cmp(&a.memory_count).then(a.name.cmp(&b.name)));
        Ok(clusters)
    }

    /// A user's clusters, largest first.
    pub async fn list_clusters(&self, user_id: &str) -> Result<Vec<MemoryCluster>> {
        db::list_clusters(&self.db, user_id).await
    }
}
