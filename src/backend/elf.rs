// ELF writer for bfc
// Wraps a finished code buffer in the smallest ELF32 image a Linux
// kernel will load: one header, one PT_LOAD entry, then the code.
// No sections, no symbols, no interpreter.

use std::fs::{self, File};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Byte sizes of the two structures preceding the code.
pub const ELF_HEADER_SIZE: u32 = 52;
pub const PROGRAM_HEADER_SIZE: u32 = 32;

/// Virtual address the segment is mapped at. The entry point sits right
/// behind the two headers: 0x08048054.
pub const LOAD_ADDRESS: u32 = 0x0804_8000;

pub struct ElfImage {
    code: Vec<u8>,
}

impl ElfImage {
    pub fn new(code: Vec<u8>) -> Self {
        Self { code }
    }

    /// Serialize the complete image: ELF header, program header, code.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut image = Vec::with_capacity(
            (ELF_HEADER_SIZE + PROGRAM_HEADER_SIZE) as usize + self.code.len(),
        );
        self.write_header(&mut image);
        self.write_program_header(&mut image);
        image.extend_from_slice(&self.code);
        image
    }

    /// Write the image to disk and mark it executable for user, group
    /// and other, keeping the rest of the file's mode bits.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        let image = self.to_bytes();

        let mut file = File::create(path)?;
        file.write_all(&image)?;
        drop(file);

        let mut permissions = fs::metadata(path)?.permissions();
        permissions.set_mode(permissions.mode() | 0o111);
        fs::set_permissions(path, permissions)?;

        log::debug!("wrote {} byte image to {}", image.len(), path.display());
        Ok(())
    }

    // ELF header, 52 bytes little-endian.
    // http://www.sco.com/developers/gabi/1998-04-29/ch4.eheader.html
    fn write_header(&self, out: &mut Vec<u8>) {
        let entry_point = LOAD_ADDRESS + ELF_HEADER_SIZE + PROGRAM_HEADER_SIZE;

        out.extend_from_slice(b"\x7FELF"); // file identifier
        out.push(1); // 32-bit
        out.push(1); // little-endian
        out.push(1); // current header version
        out.push(0); // Unix System V ABI
        out.push(0); // ABI version
        out.extend_from_slice(&[0; 7]); // padding to 16 bytes

        out.extend_from_slice(&2u16.to_le_bytes()); // executable file
        out.extend_from_slice(&3u16.to_le_bytes()); // Intel 80386
        out.extend_from_slice(&1u32.to_le_bytes()); // current object file version
        out.extend_from_slice(&entry_point.to_le_bytes()); // entry point
        out.extend_from_slice(&ELF_HEADER_SIZE.to_le_bytes()); // program header offset
        out.extend_from_slice(&0u32.to_le_bytes()); // section header offset (none)
        out.extend_from_slice(&0u32.to_le_bytes()); // processor flags (none)
        out.extend_from_slice(&(ELF_HEADER_SIZE as u16).to_le_bytes()); // ELF header size
        out.extend_from_slice(&(PROGRAM_HEADER_SIZE as u16).to_le_bytes()); // program header size
        out.extend_from_slice(&1u16.to_le_bytes()); // program header table entries
        out.extend_from_slice(&0u16.to_le_bytes()); // section header size (none)
        out.extend_from_slice(&0u16.to_le_bytes()); // section header table entries (none)
        out.extend_from_slice(&0u16.to_le_bytes()); // string table entry index (none)
    }

    // Single PT_LOAD program header, 32 bytes: the whole file is mapped
    // one-to-one. The emitted program needs no writable segment because
    // its tape lives on the stack.
    // http://www.sco.com/developers/gabi/1998-04-29/ch5.pheader.html
    fn write_program_header(&self, out: &mut Vec<u8>) {
        let file_size = ELF_HEADER_SIZE + PROGRAM_HEADER_SIZE + self.code.len() as u32;

        out.extend_from_slice(&1u32.to_le_bytes()); // load segment into memory
        out.extend_from_slice(&0u32.to_le_bytes()); // file offset
        out.extend_from_slice(&LOAD_ADDRESS.to_le_bytes()); // virtual memory address
        out.extend_from_slice(&LOAD_ADDRESS.to_le_bytes()); // physical memory address
        out.extend_from_slice(&file_size.to_le_bytes()); // file image size
        out.extend_from_slice(&file_size.to_le_bytes()); // memory image size
        out.extend_from_slice(&(0x1u32 | 0x4).to_le_bytes()); // execute and read flags
        out.extend_from_slice(&0x1000u32.to_le_bytes()); // alignment (4 KiB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_u32(image: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(image[offset..offset + 4].try_into().unwrap())
    }

    fn field_u16(image: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes(image[offset..offset + 2].try_into().unwrap())
    }

    #[test]
    fn test_image_layout() {
        let code = vec![0xCD, 0x80];
        let image = ElfImage::new(code.clone()).to_bytes();

        assert_eq!(image.len(), 84 + code.len());
        assert_eq!(&image[0..4], b"\x7FELF");
        assert_eq!(image[4], 1); // ELFCLASS32
        assert_eq!(image[5], 1); // little-endian
        assert_eq!(&image[84..], &code[..]);
    }

    #[test]
    fn test_header_fields() {
        let image = ElfImage::new(vec![0x90]).to_bytes();

        assert_eq!(field_u16(&image, 16), 2); // e_type: EXEC
        assert_eq!(field_u16(&image, 18), 3); // e_machine: i386
        assert_eq!(field_u32(&image, 24), 0x0804_8054); // e_entry
        assert_eq!(field_u32(&image, 28), 52); // e_phoff
        assert_eq!(field_u32(&image, 32), 0); // e_shoff
        assert_eq!(field_u16(&image, 40), 52); // e_ehsize
        assert_eq!(field_u16(&image, 42), 32); // e_phentsize
        assert_eq!(field_u16(&image, 44), 1); // e_phnum
        assert_eq!(field_u16(&image, 48), 0); // e_shnum
    }

    #[test]
    fn test_program_header_fields() {
        let code = vec![0u8; 19];
        let image = ElfImage::new(code).to_bytes();
        let ph = 52;

        assert_eq!(field_u32(&image, ph), 1); // p_type: PT_LOAD
        assert_eq!(field_u32(&image, ph + 4), 0); // p_offset
        assert_eq!(field_u32(&image, ph + 8), 0x0804_8000); // p_vaddr
        assert_eq!(field_u32(&image, ph + 12), 0x0804_8000); // p_paddr
        assert_eq!(field_u32(&image, ph + 16), 84 + 19); // p_filesz
        assert_eq!(field_u32(&image, ph + 20), 84 + 19); // p_memsz
        assert_eq!(field_u32(&image, ph + 24), 0x5); // p_flags: X | R
        assert_eq!(field_u32(&image, ph + 28), 0x1000); // p_align
    }

    #[test]
    fn test_written_file_is_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");

        ElfImage::new(vec![0xCD, 0x80]).write_to(&path).unwrap();

        let metadata = fs::metadata(&path).unwrap();
        assert_eq!(metadata.len(), 86);
        assert_eq!(metadata.permissions().mode() & 0o111, 0o111);
    }

    #[test]
    fn test_existing_file_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        fs::write(&path, vec![0u8; 4096]).unwrap();

        ElfImage::new(vec![0x90]).write_to(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 85);
    }
}
