use std::env;
use std::fs;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use walkdir::WalkDir;

static TEST_DATA: &str = "./tests/data/";
static TEST_DATA_VM: &str = "./tests/data_vm/";
static TEST_TEMPLATE: &str = r#"
    #[test]
    fn {test_name}() {
        let filename = Path::new("{filename}");
        do_test(filename, {bytecode});
    }
"#;

fn main() {
    let out_dir = env::var_os("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("test_files.rs");

    let file = fs::File::create(&dest_path).unwrap();
    let mut buf = BufWriter::new(file);

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={}", TEST_DATA);
    println!("cargo:rerun-if-changed={}", TEST_DATA_VM);

    write_tests(&mut buf, TEST_DATA, "", false);
    write_tests(&mut buf, TEST_DATA_VM, "vm_", true);
}

fn write_tests(buf: &mut impl Write, data_dir: &str, prefix: &str, bytecode: bool) {
    for entry in get_all_files(data_dir) {
        let filename = entry.path().to_str().unwrap();
        if !filename.ends_with(".lox") {
            continue;
        }

        let test_name = filename
            .replace("./", "")
            .replace('/', "_")
            .replace(".lox", "")
            .replace("tests_data_vm_", "")
            .replace("tests_data_", "");

        let test_case = TEST_TEMPLATE
            .replace("{test_name}", format!("{prefix}{test_name}").as_str())
            .replace("{filename}", filename)
            .replace("{bytecode}", if bytecode { "true" } else { "false" });

        write!(buf, "{}", test_case).unwrap();
    }
}

fn get_all_files(data_dir: &str) -> Vec<walkdir::DirEntry> {
    WalkDir::new(data_dir)
        .into_iter()
        .filter_map(|o| o.ok())
        .filter(|e| e.file_type().is_file())
        .collect()
}
