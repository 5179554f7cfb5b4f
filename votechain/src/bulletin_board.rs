use crate::*;
use chrono::{DateTime, Utc};

/// Contents of a bulletin-board leaf
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LeafPayload {
    pub ewp_version: String,
    pub election_id: String,
    pub manifest_id: Hash256,
    pub encrypted_ballot: EncryptedBallot,
    pub received_at: DateTime<Utc>,
    pub gateway_id: String,
}

impl LeafPayload {
    pub fn leaf_hash(&self) -> Result<Hash256, Error> {
        canonical_hash(DOMAIN_BB_LEAF, self)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BulletinBoardLeaf {
    pub leaf_hash: Hash256,
    pub payload: LeafPayload,
}

/// A tree head, before signing
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TreeHead {
    pub tree_size: u64,
    pub root_hash: Hash256,
    pub timestamp: DateTime<Utc>,
    pub kid: String,
}

impl Signable for TreeHead {
    fn kid(&self) -> &str {
        &self.kid
    }
}

pub type SignedTreeHead = Signed<TreeHead>;

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// One step of an audit path: the sibling hash and which side it sits on
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProofStep {
    pub side: Side,
    pub hash: Hash256,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InclusionProof {
    pub leaf_hash: Hash256,
    pub leaf_index: u64,
    pub tree_size: u64,
    pub root_hash: Hash256,
    pub path: Vec<ProofStep>,
}

impl InclusionProof {
    /// Fold the path from the leaf and compare with the claimed root
    pub fn verify(&self) -> bool {
        let computed = self.path.iter().fold(self.leaf_hash, |acc, step| match step.side {
            Side::Left => node_hash(&step.hash, &acc),
            Side::Right => node_hash(&acc, &step.hash),
        });
        computed == self.root_hash
    }
}

pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    tagged_hash(DOMAIN_BB_NODE, &[&left.0[..], &right.0[..]])
}

pub fn empty_root() -> Hash256 {
    tagged_hash(DOMAIN_BB_EMPTY, &[])
}

fn next_level(level: &[Hash256]) -> Vec<Hash256> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => node_hash(left, right),
            [odd] => node_hash(odd, odd),
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

/// Merkle root over leaf hashes. An odd node at the end of a level is paired with itself.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return empty_root();
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Inclusion proof for the leaf at `index` in the tree over `leaves`
pub fn merkle_inclusion_proof(leaves: &[Hash256], index: usize) -> Option<InclusionProof> {
    let leaf_hash = *leaves.get(index)?;
    let mut path = Vec::new();
    let mut level = leaves.to_vec();
    let mut position = index;

    while level.len() > 1 {
        let step = if position % 2 == 1 {
            ProofStep {
                side: Side::Left,
                hash: level[position - 1],
            }
        } else {
            ProofStep {
                side: Side::Right,
                hash: *level.get(position + 1).unwrap_or(&level[position]),
            }
        };
        path.push(step);
        level = next_level(&level);
        position /= 2;
    }

    Some(InclusionProof {
        leaf_hash,
        leaf_index: index as u64,
        tree_size: leaves.len() as u64,
        root_hash: level[0],
        path,
    })
}

/// Append-only Merkle log of encrypted ballots with its signed tree heads
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct BulletinBoard {
    leaves: Vec<BulletinBoardLeaf>,
    sth_history: Vec<SignedTreeHead>,
}

impl BulletinBoard {
    pub fn new() -> Self {
        BulletinBoard::default()
    }

    /// Append a leaf, returning its index and hash
    pub fn append_leaf(&mut self, payload: LeafPayload) -> Result<(u64, Hash256), Error> {
        let leaf_hash = payload.leaf_hash()?;
        self.leaves.push(BulletinBoardLeaf { leaf_hash, payload });
        Ok(((self.leaves.len() - 1) as u64, leaf_hash))
    }

    /// Sign a tree head over the current tree and record it
    pub fn issue_sth(&mut self, keypair: &Keypair, now: DateTime<Utc>) -> Result<SignedTreeHead, Error> {
        let head = TreeHead {
            tree_size: self.leaves.len() as u64,
            root_hash: self.root(),
            timestamp: now,
            kid: keypair.kid.clone(),
        };
        let sth = Signed::sign(keypair, head)?;
        debug!("bulletin board: issued STH size {} root {}", sth.tree_size, sth.root_hash);
        self.sth_history.push(sth.clone());
        Ok(sth)
    }

    pub fn leaves(&self) -> &[BulletinBoardLeaf] {
        &self.leaves
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn leaf_hashes(&self) -> Vec<Hash256> {
        self.leaves.iter().map(|leaf| leaf.leaf_hash).collect()
    }

    pub fn root(&self) -> Hash256 {
        merkle_root(&self.leaf_hashes())
    }

    pub fn sth_history(&self) -> &[SignedTreeHead] {
        &self.sth_history
    }

    pub fn latest_sth(&self) -> Option<&SignedTreeHead> {
        self.sth_history.last()
    }

    /// Inclusion proof against the current tree
    pub fn inclusion_proof(&self, index: u64) -> Option<InclusionProof> {
        merkle_inclusion_proof(&self.leaf_hashes(), index as usize)
    }

    /// Inclusion proof against the tree as it stood at `tree_size` leaves
    pub fn inclusion_proof_at(&self, index: u64, tree_size: u64) -> Result<InclusionProof, Error> {
        if index >= tree_size || tree_size > self.leaves.len() as u64 {
            return Err(Error::LeafOutOfRange { index, tree_size });
        }
        let prefix: Vec<Hash256> = self.leaves[..tree_size as usize]
            .iter()
            .map(|leaf| leaf.leaf_hash)
            .collect();
        merkle_inclusion_proof(&prefix, index as usize).ok_or(Error::LeafOutOfRange { index, tree_size })
    }

    /// Find a leaf by its hash
    pub fn find_leaf(&self, leaf_hash: Hash256) -> Option<(u64, &BulletinBoardLeaf)> {
        self.leaves
            .iter()
            .enumerate()
            .find(|(_, leaf)| leaf.leaf_hash == leaf_hash)
            .map(|(index, leaf)| (index as u64, leaf))
    }

    /// Find a leaf by the hash of the ballot it carries
    pub fn find_ballot(&self, ballot_hash: Hash256) -> Option<(u64, &BulletinBoardLeaf)> {
        self.leaves
            .iter()
            .enumerate()
            .find(|(_, leaf)| leaf.payload.encrypted_ballot.ballot_hash == ballot_hash)
            .map(|(index, leaf)| (index as u64, leaf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Hash256> {
        (0..n)
            .map(|i| tagged_hash(DOMAIN_BB_LEAF, &[&i.to_le_bytes()[..]]))
            .collect()
    }

    #[test]
    fn empty_and_single_roots() {
        assert_eq!(merkle_root(&[]), empty_root());

        let one = leaves(1);
        assert_eq!(merkle_root(&one), one[0]);

        let proof = merkle_inclusion_proof(&one, 0).unwrap();
        assert!(proof.path.is_empty());
        assert!(proof.verify());
    }

    #[test]
    fn odd_node_is_duplicated() {
        let three = leaves(3);
        let expected = node_hash(
            &node_hash(&three[0], &three[1]),
            &node_hash(&three[2], &three[2]),
        );
        assert_eq!(merkle_root(&three), expected);

        let proof = merkle_inclusion_proof(&three, 2).unwrap();
        assert_eq!(proof.path[0].side, Side::Right);
        assert_eq!(proof.path[0].hash, three[2]);
        assert_eq!(proof.path[1].side, Side::Left);
        assert!(proof.verify());
    }

    #[test]
    fn every_leaf_proves() {
        for n in 1..=9 {
            let all = leaves(n);
            let root = merkle_root(&all);
            for i in 0..n {
                let proof = merkle_inclusion_proof(&all, i).unwrap();
                assert_eq!(proof.root_hash, root);
                assert!(proof.verify(), "leaf {} of {}", i, n);
            }
            assert!(merkle_inclusion_proof(&all, n).is_none());
        }
    }

    #[test]
    fn tampered_proof_fails() {
        let all = leaves(5);
        let mut proof = merkle_inclusion_proof(&all, 3).unwrap();
        proof.path[0].hash = all[0];
        assert!(!proof.verify());

        let mut proof = merkle_inclusion_proof(&all, 3).unwrap();
        proof.leaf_hash = all[4];
        assert!(!proof.verify());

        let mut proof = merkle_inclusion_proof(&all, 3).unwrap();
        proof.path[1].side = Side::Right;
        assert!(!proof.verify());
    }

    #[test]
    fn signed_tree_heads() {
        let keypair = Keypair::generate(KeyRole::BulletinBoard.default_kid());
        let mut bb = BulletinBoard::new();

        let empty = bb.issue_sth(&keypair, Utc::now()).unwrap();
        assert_eq!(empty.tree_size, 0);
        assert_eq!(empty.root_hash, empty_root());
        empty.verify_signature(&keypair.public()).unwrap();

        let mut forged = empty.clone();
        forged.body.tree_size = 1;
        assert!(forged.verify_signature(&keypair.public()).is_err());

        assert_eq!(bb.sth_history().len(), 1);
        assert_eq!(bb.latest_sth(), Some(&empty));
    }
}
