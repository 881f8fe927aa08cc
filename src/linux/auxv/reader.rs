use {
    super::{consts::AT_NULL, AuxvPair, AuxvType},
    crate::errors::AuxvError,
    byteorder::{BigEndian, LittleEndian, ReadBytesExt},
    scroll::Endian,
    std::io::{ErrorKind, Read},
};

/// An iterator across auxv pairs, read from the procfs `auxv` file or from
/// the descriptor of an `NT_AUXV` note
pub struct ProcfsAuxvIter<R: Read> {
    reader: R,
    endian: Endian,
    done: bool,
}

impl<R: Read> ProcfsAuxvIter<R> {
    pub fn new(reader: R, endian: Endian) -> Self {
        Self {
            reader,
            endian,
            done: false,
        }
    }

    fn read_word(&mut self) -> Result<AuxvType, AuxvError> {
        let word = match self.endian {
            Endian::Little => self.reader.read_u64::<LittleEndian>(),
            Endian::Big => self.reader.read_u64::<BigEndian>(),
        };
        word.map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => AuxvError::InvalidFormat,
            _ => AuxvError::ReadFailed(e),
        })
    }

    fn read_pair(&mut self) -> Result<AuxvPair, AuxvError> {
        let key = self.read_word()?;
        let value = self.read_word()?;
        Ok(AuxvPair { key, value })
    }
}

impl<R: Read> Iterator for ProcfsAuxvIter<R> {
    type Item = Result<AuxvPair, AuxvError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.read_pair() {
            Ok(AuxvPair { key: AT_NULL, .. }) => {
                self.done = true;
                None
            }
            Ok(pair) => Some(Ok(pair)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
