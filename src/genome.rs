//! Plain genomic value types shared by the FASTA and Hi-C readers.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Info on a chromosome as recorded in a container file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chromosome {
    pub name: String,
    pub length: u32,
}

#[derive(Error, Debug)]
#[error("The passed chromosome ({}) was incorrect.", .0)]
pub struct ChromosomeNotFound(pub String);

/// An ordered chromosome list with index lookups.
///
/// Order matters: Hi-C files address chromosomes by their position in this
/// list, and fragment sites are stored in the same order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexedGenome {
    chromosomes: Vec<Chromosome>,
}

impl IndexedGenome {
    pub fn new(chromosomes: Vec<Chromosome>) -> IndexedGenome {
        IndexedGenome { chromosomes }
    }

    pub fn index_of(&self, name: &str) -> Result<u32, ChromosomeNotFound> {
        let chrom = self.chromosomes.iter().position(|c| c.name == name);
        match chrom {
            Some(i) => Ok(i as u32),
            None => Err(ChromosomeNotFound(name.to_owned())),
        }
    }

    pub fn name_at(&self, index: u32) -> Option<&str> {
        self.chromosomes.get(index as usize).map(|c| c.name.as_str())
    }

    pub fn length_at(&self, index: u32) -> Option<u32> {
        self.chromosomes.get(index as usize).map(|c| c.length)
    }

    pub fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
    }

    pub fn len(&self) -> usize {
        self.chromosomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chromosomes.is_empty()
    }
}

/// Which strand of the double helix a feature lies on.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strand {
    Positive,
    Negative,
    #[default]
    Unspecified,
}

#[derive(Error, Debug)]
#[error("Invalid strand: {}", .0)]
pub struct InvalidStrand(pub String);

impl Strand {
    pub fn complement(self) -> Strand {
        match self {
            Strand::Positive => Strand::Negative,
            Strand::Negative => Strand::Positive,
            Strand::Unspecified => Strand::Unspecified,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Strand::Positive => '+',
            Strand::Negative => '-',
            Strand::Unspecified => '.',
        }
    }
}

impl FromStr for Strand {
    type Err = InvalidStrand;

    // "1", "-1", and "0" appear in the wild as synonyms.
    fn from_str(s: &str) -> Result<Strand, InvalidStrand> {
        match s {
            "+" | "1" => Ok(Strand::Positive),
            "-" | "-1" => Ok(Strand::Negative),
            "." | "0" => Ok(Strand::Unspecified),
            _ => Err(InvalidStrand(s.to_owned())),
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A 1-based, inclusive span on a named chromosome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenomicRange {
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
}

impl GenomicRange {
    pub fn new(chromosome: impl Into<String>, start: u64, end: u64) -> GenomicRange {
        assert!(start >= 1 && end >= start, "invalid 1-based range");
        GenomicRange {
            chromosome: chromosome.into(),
            start,
            end,
            strand: Strand::Unspecified,
        }
    }

    /// The whole of one chromosome.
    pub fn full(chromosome: &Chromosome) -> GenomicRange {
        GenomicRange::new(chromosome.name.clone(), 1, u64::from(chromosome.length))
    }

    /// A copy with new coordinates on the same chromosome and strand.
    pub fn with_span(&self, start: u64, end: u64) -> GenomicRange {
        GenomicRange {
            chromosome: self.chromosome.clone(),
            start,
            end,
            strand: self.strand,
        }
    }

    pub fn contains(&self, position: u64) -> bool {
        position >= self.start && position <= self.end
    }

    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl fmt::Display for GenomicRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chromosome, self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genome_lookups() {
        let genome = IndexedGenome::new(vec![
            Chromosome {
                name: "chr1".to_owned(),
                length: 1000,
            },
            Chromosome {
                name: "chr2".to_owned(),
                length: 500,
            },
        ]);
        assert_eq!(genome.index_of("chr2").unwrap(), 1);
        assert!(genome.index_of("chrX").is_err());
        assert_eq!(genome.name_at(0), Some("chr1"));
        assert_eq!(genome.length_at(1), Some(500));
        assert_eq!(genome.name_at(2), None);
    }

    #[test]
    fn strand_symbols_and_synonyms() {
        assert_eq!("+".parse::<Strand>().unwrap(), Strand::Positive);
        assert_eq!("1".parse::<Strand>().unwrap(), Strand::Positive);
        assert_eq!("-1".parse::<Strand>().unwrap(), Strand::Negative);
        assert_eq!("0".parse::<Strand>().unwrap(), Strand::Unspecified);
        assert!("x".parse::<Strand>().is_err());
        assert_eq!(Strand::Positive.complement(), Strand::Negative);
        assert_eq!(Strand::Unspecified.complement(), Strand::Unspecified);
        assert_eq!(Strand::Negative.to_string(), "-");
    }

    #[test]
    fn range_math() {
        let range = GenomicRange::new("chr1", 100, 199);
        assert_eq!(range.length(), 100);
        assert!(range.contains(100));
        assert!(range.contains(199));
        assert!(!range.contains(200));
        let moved = range.with_span(1, 10);
        assert_eq!(moved.chromosome, "chr1");
        assert_eq!(moved.length(), 10);
    }
}
